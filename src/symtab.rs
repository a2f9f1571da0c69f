//! Output symbol-table emission: address finalisation, per-file size
//! accounting and parallel writing of the `.symtab` / `.strtab` contents.
//!
//! Layout is locals first (files in input order), then globals (same order).
//! Per-file offsets fall out of prefix sums over the sizing pass, so each
//! file writes a disjoint slice and the writes can run in parallel.

use crate::debug_assert_bail;
use crate::elf::SymtabEntry;
use crate::error::Context as _;
use crate::error::Result;
use crate::input_section::InputSection;
use crate::object_file::ObjectFile;
use crate::output_section::OutputSectionId;
use crate::output_section::OutputSections;
use anyhow::anyhow;
use anyhow::bail;
use object::LittleEndian;
use object::U16;
use object::U32;
use object::U64;
use object::read::elf::SectionHeader as _;
use object::read::elf::Sym as _;
use rayon::iter::IntoParallelIterator;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::IntoParallelRefMutIterator;
use rayon::iter::ParallelIterator;

/// Computes every owned symbol's final address from the output-section
/// addresses and input-section offsets the layout engine assigned. Section
/// backed symbols get `sh_addr + section offset + value`; absolute and
/// undefined-weak symbols keep their value. Must run before `write_symtab`.
#[tracing::instrument(skip_all, name = "Finalise symbol addresses")]
pub fn finalize_symbol_addresses(
    files: &[ObjectFile],
    output_sections: &OutputSections,
) -> Result {
    files
        .par_iter()
        .filter(|file| file.is_alive())
        .try_for_each(|file| file.finalize_symbol_addresses(output_sections))
}

/// Accumulates each live file's global `.symtab` / `.strtab` contribution.
/// Local sizes were accumulated at parse time.
#[tracing::instrument(skip_all, name = "Compute symbol table sizes")]
pub fn compute_symtab(files: &mut [ObjectFile]) {
    files
        .par_iter_mut()
        .filter(|file| file.is_alive())
        .for_each(|file| file.compute_symtab());
}

/// Sizes of the `.symtab` / `.strtab` regions: locals first, then globals,
/// files in input order within each region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymtabPlan {
    pub local_symtab_size: u64,
    pub local_strtab_size: u64,
    pub global_symtab_size: u64,
    pub global_strtab_size: u64,
}

impl SymtabPlan {
    pub fn new(files: &[ObjectFile]) -> SymtabPlan {
        let live = || files.iter().filter(|file| file.is_alive());

        let plan = SymtabPlan {
            local_symtab_size: live().map(|file| file.local_symtab_size).sum(),
            local_strtab_size: live().map(|file| file.local_strtab_size).sum(),
            global_symtab_size: live().map(|file| file.global_symtab_size).sum(),
            global_strtab_size: live().map(|file| file.global_strtab_size).sum(),
        };

        tracing::debug!(
            symtab_size = plan.symtab_size(),
            strtab_size = plan.strtab_size(),
            num_local_entries = plan.num_local_entries(),
            "planned symbol table"
        );

        plan
    }

    pub fn symtab_size(&self) -> u64 {
        self.local_symtab_size + self.global_symtab_size
    }

    pub fn strtab_size(&self) -> u64 {
        self.local_strtab_size + self.global_strtab_size
    }

    /// Entry count of the local region; this is what the output `.symtab`'s
    /// `sh_info` wants.
    pub fn num_local_entries(&self) -> u64 {
        self.local_symtab_size / size_of::<SymtabEntry>() as u64
    }
}

struct FileWriteSlices<'out, 'files, 'data> {
    file: &'files ObjectFile<'data>,
    local_syms: &'out mut [u8],
    local_strs: &'out mut [u8],
    local_str_offset: u32,
    global_syms: &'out mut [u8],
    global_strs: &'out mut [u8],
    global_str_offset: u32,
}

/// Writes the `.symtab` / `.strtab` contents for all live files.
///
/// `symtab_out` / `strtab_out` must be exactly `plan.symtab_size()` /
/// `plan.strtab_size()` bytes. `strtab_base` is the offset of `strtab_out`
/// within the final `.strtab`; pass 1 if the caller reserves the customary
/// leading NUL. The per-file writes are non-overlapping and run in parallel.
#[tracing::instrument(skip_all, name = "Write symbol table")]
pub fn write_symtab<'data>(
    files: &[ObjectFile<'data>],
    output_sections: &OutputSections<'data>,
    plan: &SymtabPlan,
    symtab_out: &mut [u8],
    strtab_out: &mut [u8],
    strtab_base: u32,
) -> Result {
    if symtab_out.len() as u64 != plan.symtab_size() {
        bail!(
            "symtab buffer is {} bytes, plan needs {}",
            symtab_out.len(),
            plan.symtab_size()
        );
    }
    if strtab_out.len() as u64 != plan.strtab_size() {
        bail!(
            "strtab buffer is {} bytes, plan needs {}",
            strtab_out.len(),
            plan.strtab_size()
        );
    }

    let (mut local_syms, mut global_syms) =
        symtab_out.split_at_mut(plan.local_symtab_size as usize);
    let (mut local_strs, mut global_strs) =
        strtab_out.split_at_mut(plan.local_strtab_size as usize);

    let mut local_str_offset = strtab_base;
    let mut global_str_offset = strtab_base + plan.local_strtab_size as u32;

    let mut work = Vec::new();
    for file in files.iter().filter(|file| file.is_alive()) {
        work.push(FileWriteSlices {
            file,
            local_syms: local_syms
                .split_off_mut(..file.local_symtab_size as usize)
                .context("local symtab sizing out of sync")?,
            local_strs: local_strs
                .split_off_mut(..file.local_strtab_size as usize)
                .context("local strtab sizing out of sync")?,
            local_str_offset,
            global_syms: global_syms
                .split_off_mut(..file.global_symtab_size as usize)
                .context("global symtab sizing out of sync")?,
            global_strs: global_strs
                .split_off_mut(..file.global_strtab_size as usize)
                .context("global strtab sizing out of sync")?,
            global_str_offset,
        });

        local_str_offset += file.local_strtab_size as u32;
        global_str_offset += file.global_strtab_size as u32;
    }

    work.into_par_iter().try_for_each(|out| {
        out.file
            .write_local_symtab(out.local_syms, out.local_strs, out.local_str_offset, output_sections)?;
        out.file.write_global_symtab(
            out.global_syms,
            out.global_strs,
            out.global_str_offset,
            output_sections,
        )
    })
}

impl<'data> ObjectFile<'data> {
    fn finalize_symbol_addresses(&self, output_sections: &OutputSections) -> Result {
        let e = LittleEndian;

        for sym in &self.symbols {
            let mut res = sym.lock();
            if res.file != Some(self.file_id) {
                continue;
            }

            match res.input_section {
                Some(index) => {
                    let slot = &self.sections[index.0];
                    debug_assert_bail!(
                        slot.is_some(),
                        "{self}: symbol `{}` resolved into a removed section",
                        String::from_utf8_lossy(sym.name())
                    );
                    match slot {
                        Some(isec) => {
                            let osec = &output_sections[output_section_id(self, isec)?];
                            res.addr = osec
                                .shdr
                                .sh_addr(e)
                                .wrapping_add(isec.offset)
                                .wrapping_add(res.value);
                        }
                        None => res.addr = res.value,
                    }
                }
                // Absolute and undefined-weak symbols keep their value.
                None => res.addr = res.value,
            }
        }
        Ok(())
    }

    fn compute_symtab(&mut self) {
        for sym in &self.symbols {
            let res = sym.resolution();
            if res.file != Some(self.file_id) || res.sym_type == object::elf::STT_SECTION {
                continue;
            }
            self.global_strtab_size += sym.name().len() as u64 + 1;
            self.global_symtab_size += size_of::<SymtabEntry>() as u64;
        }
    }

    /// Emits this file's local symbols. The slices must be exactly
    /// `local_symtab_size` / `local_strtab_size` bytes; `str_offset` is the
    /// absolute offset of `strs_out` within the output `.strtab`.
    pub fn write_local_symtab(
        &self,
        syms_out: &mut [u8],
        strs_out: &mut [u8],
        mut str_offset: u32,
        output_sections: &OutputSections,
    ) -> Result {
        let e = LittleEndian;
        let mut entries = syms_out.chunks_exact_mut(size_of::<SymtabEntry>());
        let mut str_pos = 0;

        let locals = &self.elf.elf_syms()[..self.elf.first_global];
        for (esym, name) in locals.iter().zip(&self.local_symbols) {
            if esym.st_type() == object::elf::STT_SECTION {
                continue;
            }

            let mut out_sym = *esym;
            out_sym.st_name = U32::new(e, str_offset);

            let shndx = esym.st_shndx(e);
            if shndx != object::elf::SHN_UNDEF && shndx < object::elf::SHN_LORESERVE {
                let slot = self
                    .sections
                    .get(shndx as usize)
                    .ok_or_else(|| anyhow!("{self}: invalid symbol section index: {shndx}"))?;
                match slot {
                    Some(isec) => {
                        let osec = &output_sections[output_section_id(self, isec)?];
                        out_sym.st_shndx = U16::new(e, osec.shndx as u16);
                        out_sym.st_value = U64::new(
                            e,
                            osec.shdr
                                .sh_addr(e)
                                .wrapping_add(isec.offset)
                                .wrapping_add(esym.st_value(e)),
                        );
                    }
                    None => {
                        // The section went away (COMDAT loser); the local goes
                        // with it.
                        out_sym.st_shndx = U16::new(e, object::elf::SHN_UNDEF);
                        out_sym.st_value = U64::new(e, 0);
                    }
                }
            }

            write_entry(&mut entries, &out_sym)
                .with_context(|| format!("{self}: local symtab overflow"))?;
            append_name(strs_out, &mut str_pos, name)
                .with_context(|| format!("{self}: local strtab overflow"))?;
            str_offset += name.len() as u32 + 1;
        }
        Ok(())
    }

    /// Emits the globals this file owns. Same slice contract as
    /// `write_local_symtab`.
    pub fn write_global_symtab(
        &self,
        syms_out: &mut [u8],
        strs_out: &mut [u8],
        mut str_offset: u32,
        output_sections: &OutputSections,
    ) -> Result {
        let e = LittleEndian;
        let mut entries = syms_out.chunks_exact_mut(size_of::<SymtabEntry>());
        let mut str_pos = 0;

        for (sym, esym) in self.symbols.iter().zip(self.global_syms()) {
            let res = sym.resolution();
            if res.file != Some(self.file_id) || res.sym_type == object::elf::STT_SECTION {
                continue;
            }

            let mut out_sym = *esym;
            out_sym.st_name = U32::new(e, str_offset);
            out_sym.st_value = U64::new(e, res.addr);

            let shndx = match res.input_section {
                Some(index) => {
                    let slot = &self.sections[index.0];
                    debug_assert_bail!(
                        slot.is_some(),
                        "{self}: symbol `{}` resolved into a removed section",
                        String::from_utf8_lossy(sym.name())
                    );
                    match slot {
                        Some(isec) => {
                            let osec = &output_sections[output_section_id(self, isec)?];
                            osec.shndx as u16
                        }
                        None => object::elf::SHN_ABS,
                    }
                }
                None => object::elf::SHN_ABS,
            };
            out_sym.st_shndx = U16::new(e, shndx);

            write_entry(&mut entries, &out_sym)
                .with_context(|| format!("{self}: global symtab overflow"))?;
            append_name(strs_out, &mut str_pos, sym.name())
                .with_context(|| format!("{self}: global strtab overflow"))?;
            str_offset += sym.name().len() as u32 + 1;
        }
        Ok(())
    }
}

fn output_section_id(file: &ObjectFile, isec: &InputSection) -> Result<OutputSectionId> {
    isec.output_section.ok_or_else(|| {
        anyhow!(
            "{file}: section `{}` has not been assigned an output section",
            String::from_utf8_lossy(isec.name)
        )
    })
}

fn write_entry(
    entries: &mut std::slice::ChunksExactMut<'_, u8>,
    sym: &SymtabEntry,
) -> Result {
    let out = entries.next().ok_or_else(|| anyhow!("out of symtab space"))?;
    out.copy_from_slice(object::bytes_of(sym));
    Ok(())
}

fn append_name(strs_out: &mut [u8], str_pos: &mut usize, name: &[u8]) -> Result {
    let end = *str_pos + name.len() + 1;
    let out = strs_out
        .get_mut(*str_pos..end)
        .ok_or_else(|| anyhow!("out of strtab space"))?;
    out[..name.len()].copy_from_slice(name);
    out[name.len()] = 0;
    *str_pos = end;
    Ok(())
}
