//! Board commands
//!
//! The closed set of commands understood by the acquisition board and their
//! 16-bit opcodes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commands accepted by the acquisition board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Stop any running collection and reset the board
    Reset,

    /// Start collecting for the given duration
    StartCollect,

    /// Collection duration in milliseconds
    SetDuration,

    /// Initial trigger threshold
    SetThreshold,

    /// Signal polarity
    SetSign,

    /// Signal baseline
    SetBaseline,

    /// Sampling time interval
    SetInterval,

    /// Amplifier gain
    SetGain,
}

impl Command {
    /// Every command, in opcode order
    pub const ALL: [Command; 8] = [
        Command::Reset,
        Command::StartCollect,
        Command::SetDuration,
        Command::SetThreshold,
        Command::SetSign,
        Command::SetBaseline,
        Command::SetInterval,
        Command::SetGain,
    ];

    /// The setting commands, in the order a full acquisition applies them
    pub const SETTINGS: [Command; 6] = [
        Command::SetDuration,
        Command::SetThreshold,
        Command::SetSign,
        Command::SetBaseline,
        Command::SetInterval,
        Command::SetGain,
    ];

    /// Wire opcode
    pub fn opcode(&self) -> u16 {
        match self {
            Command::Reset => 0x0000,
            Command::StartCollect => 0x0001,
            Command::SetDuration => 0x0002,
            Command::SetThreshold => 0x0003,
            Command::SetSign => 0x0004,
            Command::SetBaseline => 0x0005,
            Command::SetInterval => 0x0006,
            Command::SetGain => 0x0007,
        }
    }

    /// Look up a command by its wire opcode
    pub fn from_opcode(opcode: u16) -> Option<Command> {
        Self::ALL.into_iter().find(|cmd| cmd.opcode() == opcode)
    }

    /// Check if the board answers this command with an acknowledgement
    pub fn expects_ack(&self) -> bool {
        self.is_setting()
    }

    /// Check if this is one of the six setting commands
    pub fn is_setting(&self) -> bool {
        !matches!(self, Command::Reset | Command::StartCollect)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcodes() {
        assert_eq!(Command::Reset.opcode(), 0);
        assert_eq!(Command::StartCollect.opcode(), 1);
        assert_eq!(Command::SetGain.opcode(), 7);
    }

    #[test]
    fn test_opcode_lookup() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_opcode(cmd.opcode()), Some(cmd));
        }
        assert_eq!(Command::from_opcode(0x0100), None);
    }

    #[test]
    fn test_command_ack() {
        assert!(!Command::Reset.expects_ack());
        assert!(!Command::StartCollect.expects_ack());
        assert!(Command::SETTINGS.iter().all(|c| c.expects_ack()));
    }
}
