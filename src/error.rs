use core::fmt;

/// Errors returned by the Heymac command/frame codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Buffer was shorter than the minimum size required by the indicated
    /// CMD_ID/SUB_ID, or a write did not fit in the remaining buffer space.
    InsufficientData,

    /// The prefix byte's CMD_ID did not match any known Heymac command.
    UnknownCommand,

    /// An Associate command's SUB_ID did not match any known sub-command.
    UnknownSubcommand,

    /// Trailing bytes remained after parsing a fixed-width variant, or a
    /// fixed-width variant's buffer was too short after its header was
    /// validated.
    IncorrectSize,

    /// A named field passed to a command/frame builder is not defined for
    /// the variant being constructed.
    UnknownField,

    /// A frame's flag combination disagreed with its buffer length, or its
    /// protocol ID was not the Heymac family.
    InvalidFrame,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InsufficientData => "insufficient data",
            Error::UnknownCommand => "unknown CMD_ID",
            Error::UnknownSubcommand => "unknown SUB_ID",
            Error::IncorrectSize => "incorrect size",
            Error::UnknownField => "unknown field",
            Error::InvalidFrame => "invalid frame",
        })
    }
}
