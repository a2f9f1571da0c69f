//! Symbol resolution across input files: defined-symbol registration, the
//! archive demand-load fixpoint, undefined-weak adoption, COMDAT group
//! deduplication and common-symbol materialisation.
//!
//! The passes are barrier-separated and internally parallel. Within a pass,
//! every tie-break is decided by the totally-ordered file priority, so the
//! outcome is independent of thread count and scheduling.

use crate::comdat::ComdatOwner;
use crate::context::LinkerContext;
use crate::elf::SectionHeader;
use crate::elf::SymtabEntry;
use crate::error::Context as _;
use crate::error::Result;
use crate::input_data::FileId;
use crate::input_data::LinkInput;
use crate::input_section::InputSection;
use crate::object_file::ObjectFile;
use crate::output_section::BSS_SECTION_NAME;
use crate::output_section::OutputSectionId;
use crate::symbol::Strength;
use crate::symbol::SymbolResolution;
use anyhow::bail;
use crossbeam_queue::SegQueue;
use itertools::Itertools as _;
use object::LittleEndian;
use object::SectionIndex;
use object::U32;
use object::U64;
use object::read::elf::Sym as _;
use rayon::Scope;
use rayon::iter::IndexedParallelIterator;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::IntoParallelRefMutIterator;
use rayon::iter::ParallelIterator;
use std::sync::atomic::Ordering;

/// Parses `inputs` and runs every resolution pass over them, returning the
/// files in input order. On return, command-line objects and the archive
/// members they transitively need are alive, every global symbol has its
/// final owner, duplicate COMDAT sections are gone and common symbols are
/// backed by `.bss` input sections. Output addresses have not been assigned
/// yet; that is the layout engine's job.
#[tracing::instrument(skip_all, name = "Resolve inputs")]
pub fn resolve_inputs<'data>(
    ctx: &LinkerContext<'data>,
    inputs: &[LinkInput<'data>],
) -> Result<Vec<ObjectFile<'data>>> {
    let mut files = parse_input_files(ctx, inputs)?;

    register_defined_symbols(&files)?;
    load_archive_members(&files);
    handle_undefined_weak_symbols(&files);

    resolve_comdat_groups(&files);
    eliminate_duplicate_comdat_members(&mut files)?;

    convert_common_symbols(&mut files, ctx.bss_section);

    Ok(files)
}

#[tracing::instrument(skip_all, name = "Parse input files")]
fn parse_input_files<'data>(
    ctx: &LinkerContext<'data>,
    inputs: &[LinkInput<'data>],
) -> Result<Vec<ObjectFile<'data>>> {
    let priorities = inputs
        .iter()
        .map(|input| input.priority)
        .sorted_unstable()
        .collect_vec();
    if let Some(pair) = priorities.windows(2).find(|pair| pair[0] == pair[1]) {
        bail!("duplicate input priority: {}", pair[0]);
    }

    let files = inputs
        .par_iter()
        .enumerate()
        .map(|(index, input)| {
            ObjectFile::parse(input, FileId::from_usize(index), ctx)
                .with_context(|| format!("failed to parse {input}"))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        num_files = files.len(),
        num_symbols = ctx.symbol_table.len(),
        "parsed input files"
    );

    Ok(files)
}

#[tracing::instrument(skip_all, name = "Register defined symbols")]
fn register_defined_symbols(files: &[ObjectFile]) -> Result {
    files.par_iter().try_for_each(|file| {
        file.register_defined_symbols(files)
            .with_context(|| format!("failed to resolve symbols in {file}"))
    })
}

/// Archive demand-load fixpoint. Every command-line object is made alive;
/// each newly alive file requests the owners of its strong undefined symbols,
/// transitively, until no more archive members are needed. Workers feed new
/// files into the same pass by spawning onto the scope.
#[tracing::instrument(skip_all, name = "Load archive members")]
fn load_archive_members(files: &[ObjectFile]) {
    let activated = SegQueue::new();

    rayon::in_place_scope(|scope| {
        files
            .par_iter()
            .filter(|file| !file.is_in_archive())
            .for_each(|file| file.register_undefined_symbols(files, &activated, scope));
    });

    tracing::debug!(
        loaded_archive_members = activated.len(),
        "archive fixpoint complete"
    );
}

#[tracing::instrument(skip_all, name = "Handle undefined weak symbols")]
fn handle_undefined_weak_symbols(files: &[ObjectFile]) {
    files
        .par_iter()
        .filter(|file| file.is_alive())
        .for_each(|file| file.handle_undefined_weak_symbols(files));
}

#[tracing::instrument(skip_all, name = "Resolve COMDAT groups")]
fn resolve_comdat_groups(files: &[ObjectFile]) {
    files
        .par_iter()
        .filter(|file| file.is_alive())
        .for_each(|file| {
            for &(group, section_index) in &file.comdat_groups {
                group.claim(ComdatOwner {
                    file: file.file_id,
                    priority: file.priority,
                    section_index,
                });
            }
        });
}

#[tracing::instrument(skip_all, name = "Eliminate duplicate COMDAT sections")]
fn eliminate_duplicate_comdat_members(files: &mut [ObjectFile]) -> Result {
    files
        .par_iter_mut()
        .filter(|file| file.is_alive())
        .try_for_each(|file| -> Result {
            for i in 0..file.comdat_groups.len() {
                let (group, section_index) = file.comdat_groups[i];
                let keeps = group
                    .owner()
                    .is_some_and(|owner| {
                        owner.file == file.file_id && owner.section_index == section_index
                    });
                if !keeps {
                    file.remove_comdat_members(section_index)?;
                }
            }
            Ok(())
        })
}

#[tracing::instrument(skip_all, name = "Convert common symbols")]
fn convert_common_symbols(files: &mut [ObjectFile], bss: OutputSectionId) {
    files
        .par_iter_mut()
        .filter(|file| file.is_alive())
        .for_each(|file| file.convert_common_symbols(bss));
}

impl<'data> ObjectFile<'data> {
    fn register_defined_symbols(&self, files: &[ObjectFile<'data>]) -> Result {
        let e = LittleEndian;

        for (sym, esym) in self.symbols.iter().zip(self.global_syms()) {
            let strength = Strength::of(esym);
            if strength == Strength::Undefined {
                continue;
            }
            let input_section = self.symbol_input_section(esym)?;

            let mut res = sym.lock();
            let wins = match res.file {
                None => true,
                Some(incumbent) => {
                    strength > res.strength
                        || (strength == res.strength
                            && self.priority < files[incumbent.as_usize()].priority)
                }
            };
            if wins {
                *res = SymbolResolution {
                    file: Some(self.file_id),
                    input_section,
                    // Transient; address assignment replaces this with the
                    // final virtual address.
                    addr: esym.st_value(e),
                    value: esym.st_value(e),
                    sym_type: esym.st_type(),
                    visibility: esym.st_visibility(),
                    strength,
                    is_undef_weak: false,
                };
            }
        }
        Ok(())
    }

    fn symbol_input_section(&self, esym: &SymtabEntry) -> Result<Option<SectionIndex>> {
        let e = LittleEndian;
        let shndx = esym.st_shndx(e);
        if shndx == object::elf::SHN_ABS || shndx == object::elf::SHN_COMMON {
            return Ok(None);
        }
        if shndx as usize >= self.sections.len() {
            bail!("{self}: invalid symbol section index: {shndx}");
        }
        Ok(self.sections[shndx as usize]
            .is_some()
            .then_some(SectionIndex(shndx as usize)))
    }

    fn register_undefined_symbols<'scope>(
        &'scope self,
        files: &'scope [ObjectFile<'data>],
        activated: &'scope SegQueue<FileId>,
        scope: &Scope<'scope>,
    ) {
        if self.alive.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.is_in_archive() {
            activated.push(self.file_id);
        }

        let e = LittleEndian;
        for (sym, esym) in self.symbols.iter().zip(self.global_syms()) {
            if !esym.is_undefined(e) || esym.is_weak() {
                continue;
            }
            let Some(owner) = sym.resolution().file else {
                continue;
            };
            let owner = &files[owner.as_usize()];
            if owner.is_in_archive() && !owner.is_alive() {
                scope.spawn(move |scope| owner.register_undefined_symbols(files, activated, scope));
            }
        }
    }

    fn handle_undefined_weak_symbols(&self, files: &[ObjectFile<'data>]) {
        let e = LittleEndian;

        for (sym, esym) in self.symbols.iter().zip(self.global_syms()) {
            if !esym.is_undefined(e) || !esym.is_weak() {
                continue;
            }

            let mut res = sym.lock();
            let adopts = match res.file {
                None => true,
                Some(owner) => {
                    let owner = &files[owner.as_usize()];
                    !owner.is_alive() || (res.is_undef_weak && self.priority < owner.priority)
                }
            };
            if adopts {
                *res = SymbolResolution {
                    file: Some(self.file_id),
                    input_section: None,
                    addr: 0,
                    value: 0,
                    sym_type: esym.st_type(),
                    visibility: esym.st_visibility(),
                    strength: Strength::Undefined,
                    is_undef_weak: true,
                };
            }
        }
    }

    fn convert_common_symbols(&mut self, bss: OutputSectionId) {
        if !self.has_common_symbol {
            return;
        }

        let e = LittleEndian;
        let elf_syms = self.elf.elf_syms();
        let first_global = self.elf.first_global;

        for (i, esym) in elf_syms[first_global..].iter().enumerate() {
            if !esym.is_common(e) {
                continue;
            }

            let sym = self.symbols[i];
            let mut res = sym.lock();
            // Only the resolver's winner materialises; losing duplicates get
            // nothing.
            if res.file != Some(self.file_id) {
                continue;
            }

            let mut isec = InputSection::new(common_section_header(esym.st_size(e)), BSS_SECTION_NAME);
            isec.output_section = Some(bss);
            let index = SectionIndex(self.sections.len());
            self.sections.push(Some(isec));

            res.input_section = Some(index);
            res.addr = 0;
            res.value = 0;
        }
    }
}

fn common_section_header(size: u64) -> SectionHeader {
    let e = LittleEndian;
    SectionHeader {
        sh_name: U32::new(e, 0),
        sh_type: U32::new(e, object::elf::SHT_NOBITS),
        sh_flags: U64::new(e, u64::from(object::elf::SHF_ALLOC)),
        sh_addr: U64::new(e, 0),
        sh_offset: U64::new(e, 0),
        sh_size: U64::new(e, size),
        sh_link: U32::new(e, 0),
        sh_info: U32::new(e, 0),
        sh_addralign: U64::new(e, 1),
        sh_entsize: U64::new(e, 0),
    }
}
