//! x86 (32-bit, protected mode) architecture definitions.
//!
//! This module provides type-safe definitions for the hardware constants the
//! kernel programs directly: GDT selectors, interrupt vectors, page table
//! flags, and device I/O ports.
//!
//! # Design Philosophy
//!
//! Raw integer constants are wrapped in newtypes to prevent misuse:
//! - `SegmentSelector(u16)` for GDT selectors
//! - `Port(u16)` for I/O port addresses
//! - `PageFlags` bitflags for page table entries
//!
//! This provides compile-time safety that raw constants cannot offer.

pub mod gdt;
pub mod idt;
pub mod memory;
pub mod paging;
pub mod ports;

pub use gdt::SegmentSelector;
pub use paging::PageFlags;
pub use ports::Port;
