//! Input-file ingestion and symbol-resolution core of a parallel ELF linker.
//!
//! Given relocatable objects (possibly drawn from archives), this crate
//! parses them, interns global symbols process-wide and resolves references
//! across files: strong beats weak, the lowest input priority breaks ties,
//! and archive members load lazily. It then deduplicates COMDAT section
//! groups, materialises common symbols as `.bss` and sizes and writes the
//! output symbol table.
//!
//! The passes are barrier-separated and internally parallel:
//!
//! ```text
//! parse → register defined → archive fixpoint → undef-weak → COMDAT dedup
//!       → materialise commons → (external layout) → finalise addresses
//!       → size symtab → write symtab
//! ```
//!
//! [`resolve_inputs`] runs everything up to layout. Once the layout engine
//! has assigned output-section addresses and input-section offsets,
//! [`finalize_symbol_addresses`], [`compute_symtab`] and [`write_symtab`]
//! produce the `.symtab` / `.strtab` contents.

mod comdat;
mod context;
pub mod elf;
pub mod error;
mod input_data;
mod input_section;
mod intern;
mod object_file;
mod output_section;
mod resolution;
mod symbol;
mod symtab;

pub use crate::comdat::ComdatGroup;
pub use crate::comdat::ComdatOwner;
pub use crate::context::Arenas;
pub use crate::context::LinkerContext;
pub use crate::error::Result;
pub use crate::input_data::FileId;
pub use crate::input_data::LinkInput;
pub use crate::input_section::InputSection;
pub use crate::object_file::ObjectFile;
pub use crate::output_section::OutputSection;
pub use crate::output_section::OutputSectionId;
pub use crate::output_section::OutputSections;
pub use crate::resolution::resolve_inputs;
pub use crate::symbol::Strength;
pub use crate::symbol::Symbol;
pub use crate::symbol::SymbolResolution;
pub use crate::symbol::SymbolTable;
pub use crate::symtab::SymtabPlan;
pub use crate::symtab::compute_symtab;
pub use crate::symtab::finalize_symbol_addresses;
pub use crate::symtab::write_symtab;
