//! Decoding of the /P permission flags

use std::fmt;

/// Reserved high-order bits (13 to 32) that must be set for revision 3+
const RESERVED_HIGH_BITS: u32 = 0xFFFF_F000;

/// User access permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Print,
    PrintHighQuality,
    Modify,
    ExtractContent,
    AnnotateAndFillForms,
    FillExistingForms,
    AccessibilityExtract,
    AssembleDocument,
}

impl Capability {
    /// Every capability, in index order
    pub const ALL: [Capability; 8] = [
        Capability::Print,
        Capability::PrintHighQuality,
        Capability::Modify,
        Capability::ExtractContent,
        Capability::AnnotateAndFillForms,
        Capability::FillExistingForms,
        Capability::AccessibilityExtract,
        Capability::AssembleDocument,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::PrintHighQuality => "print-high-quality",
            Self::Modify => "modify",
            Self::ExtractContent => "extract-content",
            Self::AnnotateAndFillForms => "annotate",
            Self::FillExistingForms => "fill-forms",
            Self::AccessibilityExtract => "accessibility",
            Self::AssembleDocument => "assemble",
        }
    }

    /// Position in /P, 1 being the low-order bit
    fn bit(self) -> u32 {
        match self {
            Self::Print => 3,
            Self::Modify => 4,
            Self::ExtractContent => 5,
            Self::AnnotateAndFillForms => 6,
            Self::FillExistingForms => 9,
            Self::AccessibilityExtract => 10,
            Self::AssembleDocument => 11,
            Self::PrintHighQuality => 12,
        }
    }

    fn mask(self) -> u32 {
        1 << (self.bit() - 1)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capabilities granted by a document's /P value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSet {
    granted: [bool; 8],
    bits: i32,
    revision: u32,
}

impl PermissionSet {
    /// Decode /P for the given handler revision.
    ///
    /// Revision 2 only knows print, modify and extract; the finer capabilities
    /// follow modify or extract. From revision 3 on each capability has its own
    /// bit and is granted only if the reserved high bits are set as well.
    pub fn decode(p: i32, revision: u32) -> Self {
        let raw = p as u32;
        let mut granted = [false; 8];

        if revision < 3 {
            let has = |cap: Capability| raw & cap.mask() != 0;
            let print = has(Capability::Print);
            let modify = has(Capability::Modify);
            let extract = has(Capability::ExtractContent);

            granted[Capability::Print.index()] = print;
            granted[Capability::PrintHighQuality.index()] =
                print && has(Capability::PrintHighQuality);
            granted[Capability::Modify.index()] = modify;
            granted[Capability::ExtractContent.index()] = extract;
            granted[Capability::AnnotateAndFillForms.index()] = modify;
            granted[Capability::FillExistingForms.index()] = modify;
            granted[Capability::AccessibilityExtract.index()] = extract;
            granted[Capability::AssembleDocument.index()] = modify;
        } else {
            for cap in Capability::ALL {
                let mask = RESERVED_HIGH_BITS | cap.mask();
                granted[cap.index()] = raw & mask == mask;
            }
        }

        Self {
            granted,
            bits: p,
            revision,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.granted[capability.index()]
    }

    /// Lookup by index; out-of-range indices are simply not granted.
    pub fn has_index(&self, index: usize) -> bool {
        self.granted.get(index).copied().unwrap_or(false)
    }

    pub fn can_print(&self) -> bool {
        self.has(Capability::Print)
    }

    pub fn can_modify(&self) -> bool {
        self.has(Capability::Modify)
    }

    pub fn can_extract(&self) -> bool {
        self.has(Capability::ExtractContent)
    }

    /// Granted capabilities, in index order
    pub fn granted(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|cap| self.has(*cap))
    }

    /// The raw /P value
    pub fn bits(&self) -> i32 {
        self.bits
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.granted().map(Capability::name).collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(", "))
        }
    }
}
