//! Response encoding and typed writers.
//!
//! All responses funnel through the [`ResponseEncoder`]: each write locks
//! the encoder mutex, emits one complete response, and releases, so
//! concurrent writers (command handlers, IDLE update emitters) never
//! interleave partial responses.

use std::io;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;

use mailtide_proto::{
    Encoder, FetchData, Flags, ListData, Mailbox, SeqNum, StatusData, StatusResponse,
};

use crate::conn::BoxedIo;
use crate::error::ServerResult;
use crate::session::CopyData;

struct EncoderState {
    writer: Option<WriteHalf<BoxedIo>>,
    utf8_accepted: bool,
}

/// Mutex-serialised response writer shared by everything that emits on a
/// connection.
pub struct ResponseEncoder {
    inner: Mutex<EncoderState>,
    write_timeout: Duration,
}

impl ResponseEncoder {
    /// Wraps the write half of a connection.
    #[must_use]
    pub fn new(writer: WriteHalf<BoxedIo>, write_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(EncoderState {
                writer: Some(writer),
                utf8_accepted: false,
            }),
            write_timeout,
        }
    }

    /// Builds one response with `build` and writes it atomically.
    pub async fn send<F>(&self, build: F) -> io::Result<()>
    where
        F: FnOnce(&mut Encoder),
    {
        let mut state = self.inner.lock().await;
        let mut enc = Encoder::new();
        enc.set_utf8_accepted(state.utf8_accepted);
        build(&mut enc);
        let Some(writer) = state.writer.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection writer closed",
            ));
        };
        let write = async {
            writer.write_all(enc.as_bytes()).await?;
            writer.flush().await
        };
        match timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "response write timed out",
            )),
        }
    }

    /// Writes a status response line.
    pub async fn send_status(
        &self,
        tag: Option<&str>,
        status: &StatusResponse,
    ) -> io::Result<()> {
        self.send(|enc| {
            enc.status_response(tag, status);
        })
        .await
    }

    /// Writes a continuation request.
    pub async fn continuation(&self, text: &str) -> io::Result<()> {
        self.send(|enc| {
            enc.continuation_request(text);
        })
        .await
    }

    /// Switches string and mailbox encoding to UTF-8 (ENABLE UTF8=ACCEPT).
    pub async fn set_utf8_accepted(&self, accepted: bool) {
        self.inner.lock().await.utf8_accepted = accepted;
    }

    /// Removes the write half for an in-place TLS upgrade.
    pub(crate) async fn take_writer(&self) -> Option<WriteHalf<BoxedIo>> {
        self.inner.lock().await.writer.take()
    }

    /// Restores the write half after a TLS upgrade.
    pub(crate) async fn restore_writer(&self, writer: WriteHalf<BoxedIo>) {
        self.inner.lock().await.writer = Some(writer);
    }

    /// Shuts the writer down; later sends fail.
    pub async fn close(&self) {
        let mut state = self.inner.lock().await;
        if let Some(mut writer) = state.writer.take() {
            let _ = writer.shutdown().await;
        }
    }
}

impl std::fmt::Debug for ResponseEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEncoder").finish_non_exhaustive()
    }
}

/// Writer for untagged FETCH responses.
#[derive(Debug, Clone)]
pub struct FetchWriter {
    enc: Arc<ResponseEncoder>,
}

impl FetchWriter {
    /// Creates a FETCH writer over the connection encoder.
    #[must_use]
    pub fn new(enc: Arc<ResponseEncoder>) -> Self {
        Self { enc }
    }

    /// Emits `* <seq> FETCH (FLAGS (...))`, with UID when known.
    pub async fn write_flags(
        &self,
        seq: SeqNum,
        uid: Option<u32>,
        flags: &Flags,
    ) -> ServerResult<()> {
        self.enc
            .send(|enc| {
                enc.num_response(seq, "FETCH").sp().begin_list();
                enc.atom("FLAGS").sp().flags(flags);
                if let Some(uid) = uid {
                    enc.sp().atom("UID").sp().number(uid);
                }
                enc.end_list().crlf();
            })
            .await?;
        Ok(())
    }

    /// Emits one message's FETCH data with items in stable order.
    pub async fn write_fetch_data(&self, data: &FetchData) -> ServerResult<()> {
        self.enc
            .send(|enc| {
                enc.num_response(data.seq, "FETCH").sp();
                data.encode_items(enc);
                enc.crlf();
            })
            .await?;
        Ok(())
    }
}

/// Writer for untagged LIST responses and their STATUS companions.
#[derive(Debug, Clone)]
pub struct ListWriter {
    enc: Arc<ResponseEncoder>,
}

impl ListWriter {
    /// Creates a LIST writer over the connection encoder.
    #[must_use]
    pub fn new(enc: Arc<ResponseEncoder>) -> Self {
        Self { enc }
    }

    /// Emits `* LIST (<attrs>) <delim> <mailbox>` plus extended data and
    /// a correlated `* STATUS` companion when present.
    pub async fn write_list(&self, data: &ListData) -> ServerResult<()> {
        self.enc
            .send(|enc| {
                enc.star().atom("LIST").sp().begin_list();
                for (i, attr) in data.attrs.iter().enumerate() {
                    if i > 0 {
                        enc.sp();
                    }
                    enc.atom(&attr.as_str());
                }
                enc.end_list().sp();
                match data.delim {
                    Some(delim) => {
                        enc.quoted_string(&delim.to_string());
                    }
                    None => {
                        enc.nil();
                    }
                }
                enc.sp().mailbox(data.mailbox.as_str());
                if data.old_name.is_some() || !data.child_info.is_empty() {
                    enc.sp().begin_list();
                    let mut first = true;
                    if let Some(old) = &data.old_name {
                        enc.quoted_string("OLDNAME").sp().begin_list();
                        enc.mailbox(old.as_str());
                        enc.end_list();
                        first = false;
                    }
                    if !data.child_info.is_empty() {
                        if !first {
                            enc.sp();
                        }
                        enc.quoted_string("CHILDINFO").sp().begin_list();
                        for (i, info) in data.child_info.iter().enumerate() {
                            if i > 0 {
                                enc.sp();
                            }
                            enc.quoted_string(info);
                        }
                        enc.end_list();
                    }
                    enc.end_list();
                }
                enc.crlf();
            })
            .await?;
        if let Some(status) = &data.status {
            write_status_data(&self.enc, &data.mailbox, status).await?;
        }
        Ok(())
    }
}

/// Emits a `* STATUS <mailbox> (<counters>)` response.
pub(crate) async fn write_status_data(
    enc: &ResponseEncoder,
    mailbox: &Mailbox,
    data: &StatusData,
) -> ServerResult<()> {
    enc.send(|e| {
        e.star().atom("STATUS").sp().mailbox(mailbox.as_str()).sp();
        e.atom(&data.to_item_list()).crlf();
    })
    .await?;
    Ok(())
}

/// Writer for mailbox-level update responses.
#[derive(Debug, Clone)]
pub struct UpdateWriter {
    enc: Arc<ResponseEncoder>,
}

impl UpdateWriter {
    /// Creates an update writer over the connection encoder.
    #[must_use]
    pub fn new(enc: Arc<ResponseEncoder>) -> Self {
        Self { enc }
    }

    /// Emits `* <n> EXISTS`.
    pub async fn write_exists(&self, n: u32) -> ServerResult<()> {
        self.enc
            .send(|enc| {
                enc.num_response(n, "EXISTS").crlf();
            })
            .await?;
        Ok(())
    }

    /// Emits `* <n> RECENT`.
    pub async fn write_recent(&self, n: u32) -> ServerResult<()> {
        self.enc
            .send(|enc| {
                enc.num_response(n, "RECENT").crlf();
            })
            .await?;
        Ok(())
    }

    /// Emits `* <seq> EXPUNGE`.
    pub async fn write_expunge(&self, seq: SeqNum) -> ServerResult<()> {
        self.enc
            .send(|enc| {
                enc.num_response(seq, "EXPUNGE").crlf();
            })
            .await?;
        Ok(())
    }

    /// Emits the mailbox-level `* FLAGS (...)` response.
    pub async fn write_mailbox_flags(&self, flags: &Flags) -> ServerResult<()> {
        self.enc
            .send(|enc| {
                enc.star().atom("FLAGS").sp().flags(flags).crlf();
            })
            .await?;
        Ok(())
    }

    /// Emits a per-message flags update as an untagged FETCH.
    pub async fn write_message_flags(
        &self,
        seq: SeqNum,
        uid: Option<u32>,
        flags: &Flags,
    ) -> ServerResult<()> {
        FetchWriter::new(Arc::clone(&self.enc))
            .write_flags(seq, uid, flags)
            .await
    }
}

/// Writer for untagged EXPUNGE responses.
#[derive(Debug, Clone)]
pub struct ExpungeWriter {
    enc: Arc<ResponseEncoder>,
}

impl ExpungeWriter {
    /// Creates an expunge writer over the connection encoder.
    #[must_use]
    pub fn new(enc: Arc<ResponseEncoder>) -> Self {
        Self { enc }
    }

    /// Emits `* <seq> EXPUNGE`.
    pub async fn write_expunge(&self, seq: SeqNum) -> ServerResult<()> {
        self.enc
            .send(|enc| {
                enc.num_response(seq, "EXPUNGE").crlf();
            })
            .await?;
        Ok(())
    }
}

/// Writer for MOVE: expunges plus the COPYUID data for the tagged OK.
#[derive(Debug)]
pub struct MoveWriter {
    expunge: ExpungeWriter,
    copy_data: StdMutex<Option<CopyData>>,
}

impl MoveWriter {
    /// Creates a move writer over the connection encoder.
    #[must_use]
    pub fn new(enc: Arc<ResponseEncoder>) -> Self {
        Self {
            expunge: ExpungeWriter::new(enc),
            copy_data: StdMutex::new(None),
        }
    }

    /// Emits `* <seq> EXPUNGE` for a moved message.
    pub async fn write_expunge(&self, seq: SeqNum) -> ServerResult<()> {
        self.expunge.write_expunge(seq).await
    }

    /// Records the COPYUID data attached to the tagged OK.
    pub fn set_copy_data(&self, data: CopyData) {
        if let Ok(mut slot) = self.copy_data.lock() {
            *slot = Some(data);
        }
    }

    /// Takes the recorded COPYUID data, if any.
    #[must_use]
    pub fn take_copy_data(&self) -> Option<CopyData> {
        self.copy_data.lock().ok().and_then(|mut slot| slot.take())
    }
}
