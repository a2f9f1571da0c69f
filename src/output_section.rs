//! The output-section interface this core consumes. Layout proper happens
//! outside the core; we only need section identity, a header and the index
//! the section will have in the output section header table.

use crate::elf::SectionHeader;
use object::LittleEndian;
use object::U32;
use object::U64;
use std::ops::Index;
use std::ops::IndexMut;

pub(crate) const BSS_SECTION_NAME: &[u8] = b".bss";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputSectionId(u32);

impl OutputSectionId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct OutputSection<'data> {
    pub name: &'data [u8],

    /// `sh_addr` / `sh_offset` are filled in by the layout engine.
    pub shdr: SectionHeader,

    /// Index in the output file's section header table; written into emitted
    /// `st_shndx` fields. Assigned by the layout engine.
    pub shndx: u32,
}

/// Registry of output sections keyed by `(name, type, flags)`.
#[derive(Default)]
pub struct OutputSections<'data> {
    sections: Vec<OutputSection<'data>>,
    by_key: hashbrown::HashMap<SectionKey<'data>, OutputSectionId>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct SectionKey<'data> {
    name: &'data [u8],
    sh_type: u32,
    sh_flags: u64,
}

impl<'data> OutputSections<'data> {
    /// Returns the section for `(name, type, flags)`, creating it if absent.
    pub fn get_or_create(
        &mut self,
        name: &'data [u8],
        sh_type: u32,
        sh_flags: u64,
    ) -> OutputSectionId {
        let key = SectionKey {
            name,
            sh_type,
            sh_flags,
        };
        *self.by_key.entry(key).or_insert_with(|| {
            let e = LittleEndian;
            let id = OutputSectionId(self.sections.len() as u32);
            self.sections.push(OutputSection {
                name,
                shdr: SectionHeader {
                    sh_name: U32::new(e, 0),
                    sh_type: U32::new(e, sh_type),
                    sh_flags: U64::new(e, sh_flags),
                    sh_addr: U64::new(e, 0),
                    sh_offset: U64::new(e, 0),
                    sh_size: U64::new(e, 0),
                    sh_link: U32::new(e, 0),
                    sh_info: U32::new(e, 0),
                    sh_addralign: U64::new(e, 1),
                    sh_entsize: U64::new(e, 0),
                },
                shndx: 0,
            });
            id
        })
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputSection<'data>> {
        self.sections.iter()
    }
}

impl<'data> Index<OutputSectionId> for OutputSections<'data> {
    type Output = OutputSection<'data>;

    fn index(&self, id: OutputSectionId) -> &Self::Output {
        &self.sections[id.as_usize()]
    }
}

impl IndexMut<OutputSectionId> for OutputSections<'_> {
    fn index_mut(&mut self, id: OutputSectionId) -> &mut Self::Output {
        &mut self.sections[id.as_usize()]
    }
}
