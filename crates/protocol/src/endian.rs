//! Byte-Reihenfolge-Erkennung und -Normalisierung
//!
//! Audio-Puffer werden als rohe 32-Bit-Samples uebertragen. Weicht die
//! native Byte-Reihenfolge des Geraets von der des Wiedergabeziels ab,
//! muss jede 4-Byte-Gruppe gespiegelt werden. Der Tausch arbeitet auf
//! echten Byte-Grenzen, nicht auf logischen Sample-Indizes.

use serde::{Deserialize, Serialize};

/// Byte-Reihenfolge eines 32-Bit-Werts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Niederwertigstes Byte zuerst
    Little,
    /// Hoechstwertigstes Byte zuerst
    Big,
}

impl Endianness {
    /// Erkennt die native Byte-Reihenfolge der Plattform.
    ///
    /// Schreibt einen 2-Byte-Probewert und prueft, welches Byte zuerst
    /// im Speicher liegt. Rein und deterministisch; das Ergebnis darf
    /// vom Aufrufer gecacht werden.
    pub fn native() -> Self {
        let probe: u16 = 1;
        if probe.to_ne_bytes()[0] == 1 {
            Self::Little
        } else {
            Self::Big
        }
    }
}

impl std::fmt::Display for Endianness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Little => write!(f, "little"),
            Self::Big => write!(f, "big"),
        }
    }
}

/// Normalisiert einen Puffer von 32-Bit-Werten von `von` nach `nach`.
///
/// Bei `von == nach` ist dies ein No-op (keine Kopie). Andernfalls wird
/// die Byte-Reihenfolge innerhalb jeder nicht-ueberlappenden 4-Byte-Gruppe
/// gespiegelt; der Schritt betraegt 4 Bytes pro Gruppe. Bytes hinter der
/// letzten vollstaendigen Gruppe bleiben unveraendert.
///
/// Der Tausch ist seine eigene Inverse: zweimaliges Anwenden stellt den
/// urspruenglichen Puffer wieder her. Die Laenge bleibt stets erhalten.
pub fn normalisieren(puffer: &mut [u8], von: Endianness, nach: Endianness) {
    if von == nach {
        return;
    }

    for gruppe in puffer.chunks_exact_mut(4) {
        gruppe.swap(0, 3);
        gruppe.swap(1, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_deterministisch() {
        assert_eq!(Endianness::native(), Endianness::native());
    }

    #[test]
    fn identitaet_unveraendert() {
        let mut puffer = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let original = puffer.clone();
        normalisieren(&mut puffer, Endianness::Little, Endianness::Little);
        assert_eq!(puffer, original);
        normalisieren(&mut puffer, Endianness::Big, Endianness::Big);
        assert_eq!(puffer, original);
    }

    #[test]
    fn gruppen_tausch_nicht_ueberlappend() {
        // Jede 4er-Gruppe wird fuer sich gespiegelt
        let mut puffer = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        normalisieren(&mut puffer, Endianness::Little, Endianness::Big);
        assert_eq!(puffer, vec![4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    fn involution() {
        let mut puffer: Vec<u8> = (0u8..32).collect();
        let original = puffer.clone();
        normalisieren(&mut puffer, Endianness::Little, Endianness::Big);
        assert_ne!(puffer, original);
        normalisieren(&mut puffer, Endianness::Big, Endianness::Little);
        assert_eq!(puffer, original);
    }

    #[test]
    fn laenge_bleibt_erhalten() {
        for laenge in [0usize, 1, 3, 4, 7, 8, 4096] {
            let mut puffer = vec![0xABu8; laenge];
            normalisieren(&mut puffer, Endianness::Big, Endianness::Little);
            assert_eq!(puffer.len(), laenge);
        }
    }

    #[test]
    fn rest_bytes_unveraendert() {
        // 6 Bytes: eine volle Gruppe + 2 Rest-Bytes
        let mut puffer = vec![1u8, 2, 3, 4, 5, 6];
        normalisieren(&mut puffer, Endianness::Little, Endianness::Big);
        assert_eq!(puffer, vec![4, 3, 2, 1, 5, 6]);
    }

    #[test]
    fn f32_wert_korrekt_getauscht() {
        let wert: f32 = 0.5;
        let mut puffer = wert.to_le_bytes().to_vec();
        normalisieren(&mut puffer, Endianness::Little, Endianness::Big);
        assert_eq!(puffer, wert.to_be_bytes());
    }

    #[test]
    fn display_format() {
        assert_eq!(Endianness::Little.to_string(), "little");
        assert_eq!(Endianness::Big.to_string(), "big");
    }
}
