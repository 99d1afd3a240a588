//! Per-connection NETCONF subsystem loop.
//!
//! Sends the server hello, then processes framed messages strictly
//! sequentially: a reply is sent (or dispatch is known to have produced
//! none) before the next request is read. Cancelling the session unblocks
//! the framed read and exits the loop; the session-store entry is left in
//! place and removed only by an explicit `<close-session>`.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::framing::{FrameError, FrameReader, FrameWriter};
use crate::message;
use crate::translator::Translator;

pub struct NetconfSession<R, W> {
    session_id: String,
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    translator: Arc<Translator>,
    dispatch_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<R, W> NetconfSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        session_id: String,
        reader: FrameReader<R>,
        writer: FrameWriter<W>,
        translator: Arc<Translator>,
        dispatch_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session_id,
            reader,
            writer,
            translator,
            dispatch_timeout,
            shutdown,
        }
    }

    /// Run the subsystem until the transport closes, a framing error occurs
    /// or the session is cancelled.
    pub async fn serve(mut self) -> Result<(), FrameError> {
        info!(session = %self.session_id, "starting netconf subsystem");

        if let Some(hello) = self.dispatch(message::REQUEST_HELLO).await {
            self.writer.send(&hello).await?;
        }

        loop {
            let request = tokio::select! {
                _ = self.shutdown.changed() => {
                    debug!(session = %self.session_id, "session cancelled");
                    break;
                }
                received = self.reader.read_message() => match received {
                    Ok(Some(request)) => request,
                    Ok(None) => {
                        debug!(session = %self.session_id, "peer closed the transport");
                        break;
                    }
                    Err(e) => {
                        debug!(session = %self.session_id, "receive error: {}", e);
                        let _ = self.writer.close().await;
                        return Err(e);
                    }
                },
            };

            if let Some(reply) = self.dispatch(&request).await {
                if let Err(e) = self.writer.send(&reply).await {
                    debug!(session = %self.session_id, "send error: {}", e);
                    break;
                }
            }
        }

        let _ = self.writer.close().await;
        info!(session = %self.session_id, "finishing netconf subsystem");
        Ok(())
    }

    async fn dispatch(&self, raw: &[u8]) -> Option<Vec<u8>> {
        match timeout(
            self.dispatch_timeout,
            self.translator.handle(&self.session_id, raw),
        )
        .await
        {
            Ok(reply) => reply,
            Err(_) => {
                warn!(session = %self.session_id, "dispatch deadline exceeded");
                None
            }
        }
    }
}
