//! Process-wide interned symbols and the table that interns them.

use crate::elf::SymtabEntry;
use crate::input_data::FileId;
use crate::intern::ConcurrentInternMap;
use colosseum::sync::Arena;
use object::LittleEndian;
use object::read::elf::Sym as _;
use std::fmt;
use std::sync::Mutex;
use std::sync::MutexGuard;

/// One symbol per unique global name. Interned via [`SymbolTable`], so equal
/// names yield the same `&Symbol` on every thread. The resolution state is
/// guarded by a per-symbol mutex; it is only contended while the resolution
/// passes run and is quiescent at every pass barrier.
pub struct Symbol<'data> {
    name: &'data [u8],
    resolution: Mutex<SymbolResolution>,
}

/// Where a symbol currently resolves to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SymbolResolution {
    /// The winning file, if any.
    pub file: Option<FileId>,
    /// The winning section within that file. None for absolute symbols,
    /// commons that haven't been materialised yet and undefined-weak owners.
    pub input_section: Option<object::SectionIndex>,
    /// Final virtual address once output addresses have been assigned. Holds
    /// the raw `st_value` until then.
    pub addr: u64,
    /// The `st_value` of the winning definition.
    pub value: u64,
    pub sym_type: u8,
    pub visibility: u8,
    /// Rank of the winning definition.
    pub strength: Strength,
    /// The current owner is an undefined weak reference.
    pub is_undef_weak: bool,
}

/// How strongly a definition binds. A candidate displaces the incumbent only
/// with a strictly greater strength, or an equal strength and a lower file
/// priority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strength {
    /// Not a definition (also used for undefined-weak owners).
    #[default]
    Undefined,
    /// `STB_WEAK` definition.
    Weak,
    /// `SHN_COMMON` tentative definition.
    Common,
    /// Any other definition.
    Strong,
}

impl Strength {
    pub(crate) fn of(esym: &SymtabEntry) -> Strength {
        let e = LittleEndian;
        if esym.is_undefined(e) {
            Strength::Undefined
        } else if esym.is_weak() {
            Strength::Weak
        } else if esym.is_common(e) {
            Strength::Common
        } else {
            Strength::Strong
        }
    }
}

impl SymbolResolution {
    /// The winning definition had weak binding.
    pub fn is_weak(&self) -> bool {
        self.strength == Strength::Weak
    }
}

impl<'data> Symbol<'data> {
    pub(crate) fn new(name: &'data [u8]) -> Self {
        Self {
            name,
            resolution: Mutex::new(SymbolResolution::default()),
        }
    }

    pub fn name(&self) -> &'data [u8] {
        self.name
    }

    /// Copies out the current resolution.
    pub fn resolution(&self) -> SymbolResolution {
        *self.resolution.lock().unwrap()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SymbolResolution> {
        self.resolution.lock().unwrap()
    }
}

impl fmt::Debug for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", String::from_utf8_lossy(self.name))
    }
}

/// Process-wide name → symbol interner. Symbols are zero-initialised on
/// creation and live for the whole link session.
pub struct SymbolTable<'data> {
    map: ConcurrentInternMap<'data, Symbol<'data>>,
}

impl<'data> SymbolTable<'data> {
    pub(crate) fn new(arena: &'data Arena<Symbol<'data>>) -> Self {
        Self {
            map: ConcurrentInternMap::new(arena),
        }
    }

    /// Returns the unique `Symbol` for `name`, interning it on first use.
    pub fn intern(&self, name: &'data [u8]) -> &'data Symbol<'data> {
        self.map.insert_or_get(name, || Symbol::new(name))
    }

    pub fn get(&self, name: &[u8]) -> Option<&'data Symbol<'data>> {
        self.map.get(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
