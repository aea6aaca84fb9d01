//! Client-seitige Verbindung zum Gespraechsdienst
//!
//! Nutzt den FrameCodec aus plauder-protocol fuer das Wire-Format
//! (u32 BE Laenge + binaere Nachricht). Der Lese-Task dekodiert
//! eingehende Frames in Empfangsreihenfolge und reicht sie als
//! Ereignisse an die Sitzung weiter; das Senden gehoert der Sitzung.

use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use plauder_core::{PlauderError, Result};
use plauder_protocol::{Ausgehend, FrameCodec};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::codec::Framed;

use crate::session::Ereignis;

/// Verbindung zum Gespraechsdienst
pub struct Verbindung {
    /// Sende-Haelfte des Framed-Streams
    sink: SplitSink<Framed<TcpStream, FrameCodec>, Ausgehend>,
    /// Lese-Task (dekodiert und leitet an die Sitzung weiter)
    leser: tokio::task::JoinHandle<()>,
}

impl Verbindung {
    /// Baut eine TCP-Verbindung zum Gespraechsdienst auf.
    ///
    /// Dekodierte Nachrichten laufen ueber `ereignis_tx` in die Sitzung.
    /// Ein Dekodierfehler verwirft nur den betroffenen Frame; das
    /// Verbindungsende wird als `Ereignis::Getrennt` gemeldet.
    pub async fn verbinden(
        adresse: &str,
        port: u16,
        ereignis_tx: UnboundedSender<Ereignis>,
    ) -> Result<Self> {
        let address = format!("{}:{}", adresse, port);
        tracing::info!("Verbinde mit {}", address);
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| PlauderError::Verbindung(format!("{address}: {e}")))?;
        tracing::info!("TCP-Verbindung hergestellt zu {}", address);

        let framed = Framed::new(stream, FrameCodec::new());
        let (sink, mut empfang) = framed.split();

        let leser = tokio::spawn(async move {
            loop {
                match empfang.next().await {
                    Some(Ok(nachricht)) => {
                        if ereignis_tx.send(Ereignis::Eingehend(nachricht)).is_err() {
                            // Sitzung beendet
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        // Frame verworfen, Verbindung bleibt nutzbar
                        tracing::warn!("Eingehende Nachricht verworfen: {}", e);
                    }
                    None => {
                        tracing::info!("Verbindung vom Dienst getrennt");
                        let _ = ereignis_tx.send(Ereignis::Getrennt);
                        break;
                    }
                }
            }
        });

        Ok(Self { sink, leser })
    }

    /// Sendet eine Nachricht an den Gespraechsdienst
    pub async fn senden(&mut self, nachricht: Ausgehend) -> Result<()> {
        self.sink
            .send(nachricht)
            .await
            .map_err(|e| PlauderError::Getrennt(e.to_string()))
    }

    /// Trennt die Verbindung sauber
    pub async fn schliessen(&mut self) {
        // Versuche sauber zu schliessen, ignoriere Fehler
        let _ = self.sink.close().await;
        self.leser.abort();
        tracing::info!("Verbindung getrennt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plauder_core::Token;
    use plauder_protocol::Eingehend;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::unbounded_channel;

    /// Schreibt einen Frame von Hand: u32 BE Laenge + Nachricht
    async fn frame_schreiben(stream: &mut tokio::net::TcpStream, nachricht: &Eingehend) {
        let bytes = nachricht.encode();
        stream
            .write_all(&(bytes.len() as u32).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    /// Liest einen Frame von Hand und dekodiert ihn als Ausgehend
    async fn frame_lesen(stream: &mut tokio::net::TcpStream) -> Ausgehend {
        let mut laenge = [0u8; 4];
        stream.read_exact(&mut laenge).await.unwrap();
        let mut payload = vec![0u8; u32::from_be_bytes(laenge) as usize];
        stream.read_exact(&mut payload).await.unwrap();
        Ausgehend::decode(&payload).unwrap()
    }

    #[tokio::test]
    async fn eingehende_nachrichten_in_empfangsreihenfolge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = listener.local_addr().unwrap();
        let (tx, mut rx) = unbounded_channel();

        let dienst = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for s in ["token001", "token002"] {
                frame_schreiben(
                    &mut stream,
                    &Eingehend::Token {
                        token: Token::neu(s).unwrap(),
                    },
                )
                .await;
            }
            stream
        });

        let _verbindung = Verbindung::verbinden(&adresse.ip().to_string(), adresse.port(), tx)
            .await
            .unwrap();

        for erwartet in ["token001", "token002"] {
            match rx.recv().await {
                Some(Ereignis::Eingehend(Eingehend::Token { token })) => {
                    assert_eq!(token.als_str(), erwartet);
                }
                sonst => panic!("Unerwartetes Ereignis: {:?}", sonst),
            }
        }

        drop(dienst.await.unwrap());
        // Verbindungsende wird als Getrennt gemeldet
        assert!(matches!(rx.recv().await, Some(Ereignis::Getrennt)));
    }

    #[tokio::test]
    async fn senden_erreicht_den_dienst() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = listener.local_addr().unwrap();
        let (tx, _rx) = unbounded_channel();

        let dienst = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            (frame_lesen(&mut stream).await, frame_lesen(&mut stream).await)
        });

        let mut verbindung =
            Verbindung::verbinden(&adresse.ip().to_string(), adresse.port(), tx)
                .await
                .unwrap();
        verbindung
            .senden(Ausgehend::Open {
                prompt: "Testprompt".into(),
            })
            .await
            .unwrap();
        verbindung.senden(Ausgehend::Close).await.unwrap();

        let (erste, zweite) = dienst.await.unwrap();
        assert_eq!(
            erste,
            Ausgehend::Open {
                prompt: "Testprompt".into()
            }
        );
        assert_eq!(zweite, Ausgehend::Close);
    }

    #[tokio::test]
    async fn fehlerhafter_frame_verwirft_nur_die_nachricht() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = listener.local_addr().unwrap();
        let (tx, mut rx) = unbounded_channel();

        let dienst = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Kaputter Audio-Frame: Token-Header zu kurz
            let kaputt = [plauder_protocol::message::TAG_AUDIO_EINGEHEND, b'x'];
            stream
                .write_all(&(kaputt.len() as u32).to_be_bytes())
                .await
                .unwrap();
            stream.write_all(&kaputt).await.unwrap();
            // Danach ein gueltiger Frame
            frame_schreiben(
                &mut stream,
                &Eingehend::Token {
                    token: Token::neu("gueltig1").unwrap(),
                },
            )
            .await;
            stream
        });

        let _verbindung = Verbindung::verbinden(&adresse.ip().to_string(), adresse.port(), tx)
            .await
            .unwrap();

        // Der kaputte Frame erzeugt kein Ereignis; der gueltige kommt an
        match rx.recv().await {
            Some(Ereignis::Eingehend(Eingehend::Token { token })) => {
                assert_eq!(token.als_str(), "gueltig1");
            }
            sonst => panic!("Unerwartetes Ereignis: {:?}", sonst),
        }

        drop(dienst.await.unwrap());
    }
}
