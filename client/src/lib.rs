//! Plauder Client – Bibliotheksteil
//!
//! Kapselt Konfiguration, Verbindung und Sitzungs-Steuerung des
//! Gespraechskanals. Der Binaerteil (`main.rs`) verdrahtet nur noch
//! Konfiguration, Logging und die Eingabe-Schleife.

pub mod config;
pub mod connection;
pub mod session;

pub use config::KlientConfig;
pub use connection::Verbindung;
pub use session::{Ereignis, Sitzung, SitzungMeldung, SitzungZustand};
