//! Host status codes
//!
//! The host networking subsystem reports every operation with a numeric
//! return code. Codes are carried verbatim so callers keep full diagnostic
//! fidelity; this module only adds two sentinels of its own for transfers
//! the host reports as successful while moving zero packets.

use std::fmt;

/// Return code reported by the host networking subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostStatus(pub u32);

impl HostStatus {
    pub const SUCCESS: HostStatus = HostStatus(1000);
    pub const FAILURE: HostStatus = HostStatus(1001);
    pub const MEM_FAILURE: HostStatus = HostStatus(1002);
    pub const INVALID_ARGUMENT: HostStatus = HostStatus(1003);
    pub const SETUP_INCOMPLETE: HostStatus = HostStatus(1004);
    pub const INVALID_ACCESS: HostStatus = HostStatus(1005);
    pub const PACKET_TOO_BIG: HostStatus = HostStatus(1006);
    pub const BUFFER_EXHAUSTED: HostStatus = HostStatus(1007);
    pub const TOO_MANY_PACKETS: HostStatus = HostStatus(1008);

    /// Read reported success but produced no packet
    pub const SPURIOUS_READ: HostStatus = HostStatus(2000);
    /// Write reported success but consumed no packet
    pub const SPURIOUS_WRITE: HostStatus = HostStatus(2001);

    /// Get the raw numeric code
    pub fn code(self) -> u32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Convert into a `Result`, keeping the status as the error value
    pub fn into_result(self) -> Result<(), HostStatus> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Human readable description of a known code
    ///
    /// Returns None for codes this crate does not know about; those are
    /// still propagated unchanged.
    pub fn description(self) -> Option<&'static str> {
        let text = match self {
            Self::SUCCESS => "success",
            Self::FAILURE => "generic failure",
            Self::MEM_FAILURE => "out of memory",
            Self::INVALID_ARGUMENT => "invalid argument",
            Self::SETUP_INCOMPLETE => "interface setup is not complete",
            Self::INVALID_ACCESS => "permission denied",
            Self::PACKET_TOO_BIG => "packet size larger than MTU",
            Self::BUFFER_EXHAUSTED => "buffers exhausted temporarily in kernel",
            Self::TOO_MANY_PACKETS => "packets larger than limit",
            Self::SPURIOUS_READ => "read reported success with no packet",
            Self::SPURIOUS_WRITE => "write reported success with no packet written",
            _ => return None,
        };
        Some(text)
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => write!(f, "{} ({})", text, self.0),
            None => write!(f, "unknown status ({})", self.0),
        }
    }
}

impl From<u32> for HostStatus {
    fn from(code: u32) -> Self {
        HostStatus(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_into_result() {
        assert_eq!(HostStatus::SUCCESS.into_result(), Ok(()));
        assert_eq!(
            HostStatus::PACKET_TOO_BIG.into_result(),
            Err(HostStatus::PACKET_TOO_BIG)
        );
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let status = HostStatus::from(4242);
        assert_eq!(status.code(), 4242);
        assert!(status.description().is_none());
        assert_eq!(status.to_string(), "unknown status (4242)");
    }

    #[test]
    fn test_sentinels_are_distinct_from_host_codes() {
        assert_ne!(HostStatus::SPURIOUS_READ, HostStatus::SPURIOUS_WRITE);
        assert!(HostStatus::SPURIOUS_READ.code() >= 2000);
        assert_eq!(
            HostStatus::SPURIOUS_WRITE.to_string(),
            "write reported success with no packet written (2001)"
        );
    }
}
