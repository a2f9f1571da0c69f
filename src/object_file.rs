//! Parsing of one relocatable object: section materialisation, COMDAT group
//! registration and symbol loading.

use crate::comdat::ComdatGroup;
use crate::context::LinkerContext;
use crate::elf;
use crate::elf::SymtabEntry;
use crate::error::Context as _;
use crate::error::Result;
use crate::input_data::FileId;
use crate::input_data::LinkInput;
use crate::input_section::InputSection;
use crate::symbol::Symbol;
use anyhow::bail;
use object::LittleEndian;
use object::SectionIndex;
use object::read::elf::SectionHeader as _;
use object::read::elf::Sym as _;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// One input relocatable (or shared) object, together with everything the
/// resolution passes track about it.
pub struct ObjectFile<'data> {
    pub name: &'data str,
    pub archive_name: Option<&'data str>,
    pub file_id: FileId,

    /// Command-line / archive order; lower wins every tie-break.
    pub priority: u32,

    /// Archive members start dead and are pulled in by the resolver.
    pub(crate) alive: AtomicBool,

    pub(crate) elf: elf::File<'data>,

    /// One slot per ELF section header. None for slots that were skipped,
    /// deduplicated away or never materialised.
    pub sections: Vec<Option<InputSection<'data>>>,

    /// Names of the local symbols, aligned to the symtab entries below
    /// `first_global`.
    pub local_symbols: Vec<&'data [u8]>,

    /// Interned globals, aligned to the symtab entries from `first_global`.
    pub symbols: Vec<&'data Symbol<'data>>,

    /// COMDAT groups this file contributes, with the index of the
    /// contributing `SHT_GROUP` section.
    pub comdat_groups: Vec<(&'data ComdatGroup, SectionIndex)>,

    pub has_common_symbol: bool,

    pub local_symtab_size: u64,
    pub local_strtab_size: u64,
    pub global_symtab_size: u64,
    pub global_strtab_size: u64,
}

impl<'data> ObjectFile<'data> {
    pub(crate) fn parse(
        input: &LinkInput<'data>,
        file_id: FileId,
        ctx: &LinkerContext<'data>,
    ) -> Result<Self> {
        let elf = elf::File::parse(input.data)?;

        let mut file = ObjectFile {
            name: input.name,
            archive_name: input.archive_name,
            file_id,
            priority: input.priority,
            alive: AtomicBool::new(false),
            elf,
            sections: Vec::new(),
            local_symbols: Vec::new(),
            symbols: Vec::new(),
            comdat_groups: Vec::new(),
            has_common_symbol: false,
            local_symtab_size: 0,
            local_strtab_size: 0,
            global_symtab_size: 0,
            global_strtab_size: 0,
        };

        file.initialize_sections(ctx)?;
        file.initialize_symbols(ctx)?;

        Ok(file)
    }

    fn initialize_sections(&mut self, ctx: &LinkerContext<'data>) -> Result {
        let e = LittleEndian;
        self.sections.resize_with(self.elf.sections.len(), || None);

        for (index, shdr) in self.elf.sections.enumerate() {
            let sh_flags = shdr.sh_flags(e);
            if sh_flags & u64::from(object::elf::SHF_EXCLUDE) != 0
                && sh_flags & u64::from(object::elf::SHF_ALLOC) == 0
            {
                continue;
            }

            match shdr.sh_type(e) {
                object::elf::SHT_GROUP => {
                    let signature_sym = self
                        .elf
                        .symbol(shdr.sh_info(e) as usize)
                        .with_context(|| format!("{self}: invalid symbol index in SHT_GROUP"))?;
                    let signature = self.elf.symbol_name(signature_sym)?;

                    let entries: &[object::U32<LittleEndian>] =
                        shdr.data_as_array(e, self.elf.data)?;
                    let Some(first) = entries.first() else {
                        bail!("{self}: empty SHT_GROUP");
                    };
                    match first.get(e) {
                        0 => continue,
                        object::elf::GRP_COMDAT => {}
                        _ => bail!("{self}: unsupported SHT_GROUP format"),
                    }

                    let group = ctx.comdat_groups.insert_or_get(signature, ComdatGroup::new);
                    self.comdat_groups.push((group, index));
                }
                object::elf::SHT_SYMTAB_SHNDX => {
                    bail!("{self}: SHT_SYMTAB_SHNDX sections are not supported")
                }
                object::elf::SHT_SYMTAB
                | object::elf::SHT_STRTAB
                | object::elf::SHT_REL
                | object::elf::SHT_RELA
                | object::elf::SHT_NULL => {}
                _ => {
                    let name = self.elf.section_name(shdr)?;
                    self.sections[index.0] = Some(InputSection::new(*shdr, name));
                }
            }
        }

        // Wire RELA payloads to the sections they relocate.
        for (_, shdr) in self.elf.sections.enumerate() {
            if shdr.sh_type(e) != object::elf::SHT_RELA {
                continue;
            }
            let target = shdr.sh_info(e) as usize;
            if target >= self.sections.len() {
                bail!("{self}: invalid relocated section index: {target}");
            }
            if let Some(section) = &mut self.sections[target]
                && let Some((rels, _)) = shdr.rela(e, self.elf.data)?
            {
                section.rels = rels;
            }
        }

        Ok(())
    }

    fn initialize_symbols(&mut self, ctx: &LinkerContext<'data>) -> Result {
        let e = LittleEndian;
        let elf_syms = self.elf.elf_syms();
        let first_global = self.elf.first_global;

        self.local_symbols.reserve(first_global);
        for esym in &elf_syms[..first_global] {
            let name = self.elf.symbol_name(esym)?;
            self.local_symbols.push(name);

            if esym.st_type() != object::elf::STT_SECTION {
                self.local_strtab_size += name.len() as u64 + 1;
                self.local_symtab_size += size_of::<SymtabEntry>() as u64;
            }
        }

        self.symbols.reserve(elf_syms.len() - first_global);
        for esym in &elf_syms[first_global..] {
            let name = self.elf.symbol_name(esym)?;
            self.symbols.push(ctx.symbol_table.intern(name));

            if esym.is_common(e) {
                self.has_common_symbol = true;
            }
        }

        Ok(())
    }

    /// Drops this file's copy of a COMDAT group's member sections. Word 0 of
    /// the payload is the GRP_COMDAT flag, not a member.
    pub(crate) fn remove_comdat_members(&mut self, section_index: SectionIndex) -> Result {
        let e = LittleEndian;
        let shdr = self.elf.section(section_index)?;
        let entries: &[object::U32<LittleEndian>] = shdr.data_as_array(e, self.elf.data)?;

        for entry in entries.iter().skip(1) {
            let member = entry.get(e) as usize;
            if member >= self.sections.len() {
                bail!("{self}: invalid section index in SHT_GROUP: {member}");
            }
            self.sections[member] = None;
        }
        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_in_archive(&self) -> bool {
        self.archive_name.is_some()
    }

    /// Index of the first global entry in this file's ELF symbol table.
    pub fn first_global(&self) -> usize {
        self.elf.first_global
    }

    pub fn is_dynamic(&self) -> bool {
        self.elf.is_dynamic
    }

    pub(crate) fn global_syms(&self) -> &'data [SymtabEntry] {
        &self.elf.elf_syms()[self.elf.first_global..]
    }
}

impl fmt::Display for ObjectFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.archive_name {
            Some(archive) => write!(f, "{}:{}", archive, self.name),
            None => f.write_str(self.name),
        }
    }
}

impl fmt::Debug for ObjectFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectFile({self})")
    }
}
