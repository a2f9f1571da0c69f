//! Typed views over the ELF64 little-endian structures this crate reads and
//! writes.

use crate::error::Result;
use anyhow::bail;
use object::LittleEndian;
use object::read::elf::FileHeader as _;
use object::read::elf::SectionHeader as _;

pub type FileHeader = object::elf::FileHeader64<LittleEndian>;
pub type SectionHeader = object::elf::SectionHeader64<LittleEndian>;
pub type SymtabEntry = object::elf::Sym64<LittleEndian>;
pub type Rela = object::elf::Rela64<LittleEndian>;

pub(crate) type SectionTable<'data> = object::read::elf::SectionTable<'data, FileHeader>;
pub(crate) type SymbolTable<'data> = object::read::elf::SymbolTable<'data, FileHeader>;

/// A parsed view of one relocatable object or shared object.
pub(crate) struct File<'data> {
    pub(crate) data: &'data [u8],
    pub(crate) sections: SectionTable<'data>,
    /// This is symtab or dynsym depending on the file type.
    pub(crate) symbols: SymbolTable<'data>,
    /// Symbols below this index are local.
    pub(crate) first_global: usize,
    pub(crate) is_dynamic: bool,
}

impl<'data> File<'data> {
    pub(crate) fn parse(data: &'data [u8]) -> Result<Self> {
        let header = FileHeader::parse(data)?;
        let endian = header.endian()?;

        let is_dynamic = match header.e_type.get(endian) {
            object::elf::ET_REL => false,
            object::elf::ET_DYN => true,
            t => bail!("unsupported ELF type: {t}"),
        };

        let sections = header.sections(endian, data)?;

        let symtab_type = if is_dynamic {
            object::elf::SHT_DYNSYM
        } else {
            object::elf::SHT_SYMTAB
        };

        let mut symbols = SymbolTable::default();
        let mut first_global = 0;
        for (index, section) in sections.enumerate() {
            if section.sh_type(endian) == symtab_type {
                symbols = SymbolTable::parse(endian, data, &sections, index, section)?;
                first_global = section.sh_info(endian) as usize;
                break;
            }
        }
        if first_global > symbols.len() {
            bail!("invalid sh_info in symbol table: {first_global}");
        }

        Ok(Self {
            data,
            sections,
            symbols,
            first_global,
            is_dynamic,
        })
    }

    pub(crate) fn section(&self, index: object::SectionIndex) -> Result<&'data SectionHeader> {
        Ok(self.sections.section(index)?)
    }

    pub(crate) fn section_name(&self, section: &SectionHeader) -> Result<&'data [u8]> {
        Ok(self.sections.section_name(LittleEndian, section)?)
    }

    pub(crate) fn symbol(&self, index: usize) -> Result<&'data SymtabEntry> {
        Ok(self.symbols.symbol(object::SymbolIndex(index))?)
    }

    pub(crate) fn symbol_name(&self, symbol: &SymtabEntry) -> Result<&'data [u8]> {
        Ok(self.symbols.symbol_name(LittleEndian, symbol)?)
    }

    pub(crate) fn elf_syms(&self) -> &'data [SymtabEntry] {
        self.symbols.symbols()
    }
}
