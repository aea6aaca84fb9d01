//! Plauder Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging, verbindet sich
//! mit dem Gespraechsdienst und startet den Sitzungs-Loop. Jede
//! Eingabezeile schaltet das Gespraech um (die UI-Grenze dieses Clients).

use anyhow::Result;
use plauder_client::config::KlientConfig;
use plauder_client::connection::Verbindung;
use plauder_client::session::{Ereignis, Sitzung, SitzungMeldung};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::unbounded_channel;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("PLAUDER_CONFIG")
        .unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = KlientConfig::laden(&config_pfad)?;

    // Logging initialisieren
    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Plauder Client wird initialisiert"
    );

    let (ereignis_tx, ereignis_rx) = unbounded_channel();
    let (meldung_tx, mut meldung_rx) = unbounded_channel();

    let verbindung = Verbindung::verbinden(
        &config.verbindung.adresse,
        config.verbindung.port,
        ereignis_tx.clone(),
    )
    .await?;

    // UI-Schicht: Zustandswechsel der Sitzung anzeigen
    tokio::spawn(async move {
        while let Some(meldung) = meldung_rx.recv().await {
            match meldung {
                SitzungMeldung::GespraechBegonnen => {
                    tracing::info!("Gespraech laeuft – Enter beendet es");
                }
                SitzungMeldung::GespraechBeendet => {
                    tracing::info!("Bereit – Enter beginnt ein neues Gespraech");
                }
            }
        }
    });

    // Eingabe-Schleife: jede Zeile schaltet das Gespraech um,
    // EOF (Ctrl-D) beendet die Sitzung
    tokio::spawn(async move {
        let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match zeilen.next_line().await {
                Ok(Some(_)) => {
                    if ereignis_tx.send(Ereignis::Umschalten).is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => {
                    let _ = ereignis_tx.send(Ereignis::Beenden);
                    break;
                }
            }
        }
    });

    tracing::info!("Bereit – Enter beginnt ein Gespraech");

    // Der Sitzungs-Loop haelt cpal-Streams (nicht Send) und laeuft
    // deshalb direkt im Haupt-Task
    let sitzung = Sitzung::neu(config, verbindung, ereignis_rx, meldung_tx);
    sitzung.ausfuehren().await?;

    Ok(())
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}
