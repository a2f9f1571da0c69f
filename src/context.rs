//! Explicit process-wide linker state: the symbol interner, the COMDAT
//! signature map and the output-section registry, threaded through the passes
//! instead of living in globals.

use crate::comdat::ComdatGroup;
use crate::intern::ConcurrentInternMap;
use crate::output_section::BSS_SECTION_NAME;
use crate::output_section::OutputSectionId;
use crate::output_section::OutputSections;
use crate::symbol::Symbol;
use crate::symbol::SymbolTable;
use colosseum::sync::Arena;

/// Backing storage for interned values. Created by the caller so that
/// interned references share the input data's lifetime.
pub struct Arenas<'data> {
    pub(crate) symbols: Arena<Symbol<'data>>,
    pub(crate) comdat_groups: Arena<ComdatGroup>,
}

impl Arenas<'_> {
    pub fn new() -> Self {
        Self {
            symbols: Arena::new(),
            comdat_groups: Arena::new(),
        }
    }
}

impl Default for Arenas<'_> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LinkerContext<'data> {
    pub symbol_table: SymbolTable<'data>,

    pub(crate) comdat_groups: ConcurrentInternMap<'data, ComdatGroup>,

    pub output_sections: OutputSections<'data>,

    /// The single `.bss` output section that materialised common symbols are
    /// attached to.
    pub bss_section: OutputSectionId,
}

impl<'data> LinkerContext<'data> {
    pub fn new(arenas: &'data Arenas<'data>) -> Self {
        let mut output_sections = OutputSections::default();
        let bss_section = output_sections.get_or_create(
            BSS_SECTION_NAME,
            object::elf::SHT_NOBITS,
            u64::from(object::elf::SHF_ALLOC),
        );

        Self {
            symbol_table: SymbolTable::new(&arenas.symbols),
            comdat_groups: ConcurrentInternMap::new(&arenas.comdat_groups),
            output_sections,
            bss_section,
        }
    }

    /// Looks up an interned symbol by name.
    pub fn symbol(&self, name: &[u8]) -> Option<&'data Symbol<'data>> {
        self.symbol_table.get(name)
    }
}
