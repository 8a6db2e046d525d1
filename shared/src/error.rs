use core::fmt;

/// Failures while walking, building or patching a hand-off block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HobError {
    /// A record header or body runs past the end of the available bytes.
    Truncated { offset: usize },
    /// A record length is shorter than a header or not 8-byte granular.
    BadLength { offset: usize, length: u16 },
    /// No stack memory allocation record is present.
    StackRecordNotFound,
    /// The builder ran out of room (the end marker is always reserved).
    NoSpace { needed: usize, available: usize },
    /// A record would not fit the 16-bit length field.
    RecordTooLarge { length: usize },
    /// The handoff information table must be the first record.
    HandoffNotFirst,
}

impl HobError {
    pub fn message(&self) -> &'static str {
        match self {
            HobError::Truncated { .. } => "hob list truncated",
            HobError::BadLength { .. } => "hob record has an invalid length",
            HobError::StackRecordNotFound => "no stack memory allocation hob",
            HobError::NoSpace { .. } => "hob buffer exhausted",
            HobError::RecordTooLarge { .. } => "hob record exceeds 64 KiB",
            HobError::HandoffNotFirst => "handoff info table must lead the list",
        }
    }
}

impl fmt::Display for HobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HobError::Truncated { offset } => write!(f, "{} at +0x{:x}", self.message(), offset),
            HobError::BadLength { offset, length } => {
                write!(f, "{} ({} bytes at +0x{:x})", self.message(), length, offset)
            }
            HobError::NoSpace { needed, available } => {
                write!(f, "{} (need {}, have {})", self.message(), needed, available)
            }
            HobError::RecordTooLarge { length } => write!(f, "{} ({} bytes)", self.message(), length),
            _ => f.write_str(self.message()),
        }
    }
}
