//! Inputs to the core: one `(buffer, archive name, priority)` triple per
//! relocatable object, plus the file identifiers used throughout.

use std::fmt;

/// Index of a parsed input file. Stable for the whole link; symbols refer to
/// their owning file through a `FileId` rather than a pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(u32);

impl FileId {
    pub(crate) fn from_usize(index: usize) -> FileId {
        FileId(index as u32)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// One input object. `data` must be a complete ELF64LE image; archive
/// extraction happens upstream and hands us each member's bytes together with
/// the archive's name.
#[derive(Clone, Copy)]
pub struct LinkInput<'data> {
    pub name: &'data str,

    /// Set when the object is an archive member. Such files stay inactive
    /// until the resolver pulls them in.
    pub archive_name: Option<&'data str>,

    pub data: &'data [u8],

    /// Command-line / archive order; lower wins every tie-break. Must be
    /// unique across the input set.
    pub priority: u32,
}

impl fmt::Display for LinkInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.archive_name {
            Some(archive) => write!(f, "{}:{}", archive, self.name),
            None => f.write_str(self.name),
        }
    }
}
