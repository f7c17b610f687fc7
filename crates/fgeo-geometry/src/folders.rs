//! Alignment folder layouts registered by the detector factories.

use fgeo_error::Result;
use fgeo_readout::{DetectorManager, Frame};

/// Folder keys a detector manager answers to.
///
/// In the dynamic layout the top level is served by a per-channel global
/// folder; in the static layout every level has a regular folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderLayout {
    pub global: Option<(&'static str, Frame)>,
    pub regular: &'static [(&'static str, usize, Frame)],
    pub special: &'static [(&'static str, usize, Frame)],
}

impl FolderLayout {
    pub fn register(&self, manager: &mut DetectorManager) -> Result<()> {
        if let Some((key, frame)) = self.global {
            manager.add_global_folder(key, frame)?;
        }
        for &(key, level, frame) in self.regular {
            manager.add_folder(key, level, frame)?;
        }
        for &(key, level, frame) in self.special {
            manager.add_special_folder(key, level, frame)?;
        }
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.global
            .iter()
            .map(|(key, _)| *key)
            .chain(self.regular.iter().map(|(key, _, _)| *key))
            .chain(self.special.iter().map(|(key, _, _)| *key))
    }
}

pub const EMULSION_STATIC: FolderLayout = FolderLayout {
    global: None,
    regular: &[
        ("/Neutrino/Align/Modules", 2, Frame::Global),
        ("/Neutrino/Align/Bases", 1, Frame::Local),
    ],
    special: &[("/Neutrino/Align/Films", 0, Frame::Local)],
};

pub const EMULSION_DYNAMIC: FolderLayout = FolderLayout {
    global: Some(("/Neutrino/AlignL1/Modules", Frame::Global)),
    regular: &[("/Neutrino/AlignL2/Bases", 1, Frame::Local)],
    special: &[("/Neutrino/AlignL2/Films", 0, Frame::Local)],
};

pub const SCT_STATIC: FolderLayout = FolderLayout {
    global: None,
    regular: &[
        ("/Tracker/Align/Stations", 3, Frame::Global),
        ("/Tracker/Align/Layers", 2, Frame::Global),
        ("/Tracker/Align/Modules", 1, Frame::Local),
    ],
    special: &[("/Tracker/Align/Wafers", 0, Frame::Local)],
};

pub const SCT_DYNAMIC: FolderLayout = FolderLayout {
    global: Some(("/Tracker/AlignL1/Stations", Frame::Global)),
    regular: &[
        ("/Tracker/AlignL2/Layers", 2, Frame::Global),
        ("/Tracker/AlignL2/Modules", 1, Frame::Local),
    ],
    special: &[("/Tracker/AlignL2/Wafers", 0, Frame::Local)],
};
