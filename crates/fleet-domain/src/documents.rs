//! Indonesian identity and registration document numbers.
//!
//! Numbers are accepted with the separators they are usually printed with
//! (spaces, dots, dashes) and checked on their remaining characters.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Minimum significant characters of SIM, STNK and BPKB numbers.
pub const MIN_REGISTRATION_LEN: usize = 10;

/// Document kinds carried by drivers, vehicles and companies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Nomor Induk Kependudukan, the 16-digit national identity number
    Nik,
    /// Surat Izin Mengemudi, the driving license
    Sim,
    /// Surat Tanda Nomor Kendaraan, the vehicle registration
    Stnk,
    /// Buku Pemilik Kendaraan Bermotor, the ownership book
    Bpkb,
    /// Nomor Pokok Wajib Pajak, the 15-digit tax number
    Npwp,
}

impl DocumentKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nik => "nik",
            Self::Sim => "sim",
            Self::Stnk => "stnk",
            Self::Bpkb => "bpkb",
            Self::Npwp => "npwp",
        }
    }

    /// Whether `value` is well formed for this kind.
    #[must_use]
    pub fn is_valid(&self, value: &str) -> bool {
        let Some(core) = significant(value) else {
            return false;
        };
        match self {
            Self::Nik => core.len() == 16 && core.bytes().all(|b| b.is_ascii_digit()),
            Self::Npwp => core.len() == 15 && core.bytes().all(|b| b.is_ascii_digit()),
            Self::Sim | Self::Stnk | Self::Bpkb => {
                core.len() >= MIN_REGISTRATION_LEN && core.bytes().all(|b| b.is_ascii_alphanumeric())
            }
        }
    }

    /// [`is_valid`](Self::is_valid) as a `Result`.
    pub fn validate(&self, value: &str) -> Result<()> {
        if self.is_valid(value) {
            return Ok(());
        }
        Err(DomainError::InvariantViolation(format!(
            "malformed {} number {value:?}",
            self.as_str()
        )))
    }
}

/// Strip printing separators. `None` when anything else is left over that
/// is not alphanumeric.
fn significant(value: &str) -> Option<String> {
    let mut core = String::with_capacity(value.len());
    for c in value.trim().chars() {
        match c {
            ' ' | '.' | '-' => {}
            c if c.is_ascii_alphanumeric() => core.push(c),
            _ => return None,
        }
    }
    Some(core)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nik_is_sixteen_digits() {
        assert!(DocumentKind::Nik.is_valid("3174012505900001"));
        assert!(DocumentKind::Nik.is_valid("3174 0125 0590 0001"));
        assert!(!DocumentKind::Nik.is_valid("317401250590000"));
        assert!(!DocumentKind::Nik.is_valid("31740125059000012"));
        assert!(!DocumentKind::Nik.is_valid("31740125059000AB"));
        assert!(!DocumentKind::Nik.is_valid(""));
    }

    #[test]
    fn test_npwp_accepts_printed_format() {
        assert!(DocumentKind::Npwp.is_valid("01.234.567.8-901.000"));
        assert!(DocumentKind::Npwp.is_valid("012345678901000"));
        assert!(!DocumentKind::Npwp.is_valid("01.234.567.8-901.00"));
        assert!(!DocumentKind::Npwp.is_valid("01/234/567/8/901/000"));
    }

    #[test]
    fn test_registration_numbers_need_ten_characters() {
        assert!(DocumentKind::Sim.is_valid("1234-5678-901234"));
        assert!(DocumentKind::Stnk.is_valid("STNK12345678"));
        assert!(DocumentKind::Bpkb.is_valid("P 0123456789"));
        assert!(!DocumentKind::Sim.is_valid("123456789"));
        assert!(!DocumentKind::Bpkb.is_valid("AB#1234567890"));
    }

    #[test]
    fn test_validate_names_the_document() {
        let err = DocumentKind::Sim.validate("short").unwrap_err();
        assert!(err.to_string().contains("sim"));
        assert!(DocumentKind::Nik.validate("3174012505900001").is_ok());
    }
}
