//! Hardware address handling

use std::fmt;
use std::str::FromStr;

/// 6-byte Ethernet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Locally administered, unicast
    pub fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0 && self.0[0] & 0x01 == 0
    }
}

/// Error returned when a MAC string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacError;

impl fmt::Display for ParseMacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid MAC address syntax")
    }
}

impl std::error::Error for ParseMacError {}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Parse `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`
    ///
    /// Hosts sometimes drop leading zeros (`2:0:0:0:0:1`), so one or two hex
    /// digits per octet are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let mut octets = [0u8; 6];
        let mut count = 0;

        for part in s.split(sep) {
            if count == 6 || part.is_empty() || part.len() > 2 {
                return Err(ParseMacError);
            }
            octets[count] = u8::from_str_radix(part, 16).map_err(|_| ParseMacError)?;
            count += 1;
        }

        if count != 6 {
            return Err(ParseMacError);
        }
        Ok(MacAddress(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colon_form() {
        let mac: MacAddress = "02:42:ac:11:00:02".parse().unwrap();
        assert_eq!(mac.octets(), [0x02, 0x42, 0xac, 0x11, 0x00, 0x02]);
        assert_eq!(mac.to_string(), "02:42:ac:11:00:02");
        assert!(mac.is_local());
    }

    #[test]
    fn test_parse_short_octets() {
        let mac: MacAddress = "2:0:0:0:a:1".parse().unwrap();
        assert_eq!(mac.to_string(), "02:00:00:00:0a:01");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<MacAddress>().is_err());
        assert!("02:42:ac:11:00".parse::<MacAddress>().is_err());
        assert!("02:42:ac:11:00:02:03".parse::<MacAddress>().is_err());
        assert!("02:42:zz:11:00:02".parse::<MacAddress>().is_err());
        assert!("020:42:ac:11:00:02".parse::<MacAddress>().is_err());
    }
}
