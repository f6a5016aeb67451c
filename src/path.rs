//! Path Classifier --- parses a mount-relative path into the pieces the
//! dispatcher needs to route a call (design §4.2).
//!
//! The classifier is a pure function: it never touches the disk, and it
//! never fails. A path that doesn't mention `nf-types` simply classifies as
//! [`Opcode::Undefined`].

use std::path::Path;

/// What kind of call this path represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opcode {
    /// The path is under `nf-types/` somewhere.
    Nf,
    /// Everything else; plain passthrough territory.
    Undefined,
}

/// The pieces of a path relevant to dispatch, as defined in design §4.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedPath {
    pub opcode: Opcode,
    /// Segment immediately after `nf-types`, empty if absent.
    pub nf_type: String,
    /// Segment two after `nf-types` (the instance directory), empty if absent.
    pub instance_name: String,
    /// The final path segment.
    pub leaf_name: String,
}

impl ClassifiedPath {
    /// True when this path names an *instance directory* itself, i.e. its
    /// last segment is the instance name and nothing follows it
    /// (`nf-types/<type>/<instance>`, not a file beneath it).
    pub fn is_instance_dir(&self, path: &Path) -> bool {
        self.opcode == Opcode::Nf
            && !self.instance_name.is_empty()
            && path
                .file_name()
                .map(|n| n == self.instance_name.as_str())
                .unwrap_or(false)
    }

    /// True when this path names the type directory itself
    /// (`nf-types/<type>`, parent is `nf-types`).
    pub fn is_type_dir(&self, path: &Path) -> bool {
        self.opcode == Opcode::Nf
            && !self.nf_type.is_empty()
            && self.instance_name.is_empty()
            && path
                .file_name()
                .map(|n| n == self.nf_type.as_str())
                .unwrap_or(false)
    }
}

/// Classify a path relative to the mount root. `path` may or may not carry a
/// leading `/`; only the segments matter.
pub fn classify(path: &Path) -> ClassifiedPath {
    let segments: Vec<&str> = path.iter().filter_map(|s| s.to_str()).collect();

    let leaf_name = segments.last().copied().unwrap_or("").to_owned();

    let nf_types_idx = segments.iter().position(|s| *s == "nf-types");
    let Some(idx) = nf_types_idx else {
        return ClassifiedPath {
            opcode: Opcode::Undefined,
            nf_type: String::new(),
            instance_name: String::new(),
            leaf_name,
        };
    };

    let nf_type = segments.get(idx + 1).copied().unwrap_or("").to_owned();
    let instance_name = segments.get(idx + 2).copied().unwrap_or("").to_owned();

    ClassifiedPath { opcode: Opcode::Nf, nf_type, instance_name, leaf_name }
}
