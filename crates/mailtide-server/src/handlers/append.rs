//! APPEND with streamed literal bodies.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use mailtide_proto::datetime::parse_date_time;
use mailtide_proto::{LiteralReader, ResponseCode, StatusResponse};

use crate::conn::CommandContext;
use crate::dispatch::CommandHandler;
use crate::error::{ServerError, ServerResult};
use crate::session::AppendOptions;

/// APPEND: parse arguments, answer the continuation, stream the body to
/// the session, and realign the stream afterwards.
pub struct AppendHandler;

#[async_trait]
impl CommandHandler for AppendHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let mailbox = ctx.read_mailbox().await?;
        ctx.dec.read_sp()?;

        let mut options = AppendOptions::default();
        if ctx.dec.peek_byte() == Some(b'(') {
            options.flags = ctx.dec.read_flags()?;
            ctx.dec.read_sp()?;
        }
        if ctx.dec.peek_byte() == Some(b'"') {
            let raw = ctx.dec.read_quoted_string()?;
            options.internal_date = Some(parse_date_time(&raw)?);
            ctx.dec.read_sp()?;
        }

        let info = ctx.dec.read_literal_info()?;
        let max = ctx.conn.shared.config.max_literal_size;
        if info.size > max {
            if info.non_sync {
                // The body arrives regardless; drop it to stay aligned.
                let conn = &mut *ctx.conn;
                let reader = conn.reader.as_mut().ok_or(ServerError::Closed)?;
                crate::conn::discard_exact(reader, u64::from(info.size)).await?;
                let _ = conn.read_data_line().await?;
            }
            return Err(ServerError::Status(
                StatusResponse::no(format!("message exceeds {max} bytes"))
                    .with_code(ResponseCode::Limit),
            ));
        }
        if !info.non_sync {
            ctx.conn.enc.continuation("Ready for literal data").await?;
        }

        let conn = &mut *ctx.conn;
        let reader = conn.reader.as_mut().ok_or(ServerError::Closed)?;
        let session = conn.session.as_mut();
        let mut body = LiteralReader::new(
            reader as &mut (dyn AsyncRead + Send + Unpin),
            info.size,
        );
        let result = session.append(&mailbox, &options, &mut body).await;
        // Unread body bytes are drained on success and error alike so the
        // stream stays aligned for the next command.
        let drained = body.drain().await;
        drop(body);
        // The command line's closing CRLF follows the literal.
        let _ = conn.read_data_line().await?;
        drained?;
        let data = result?;

        let mut status = StatusResponse::ok("APPEND completed");
        if data.uid != 0 {
            status = status.with_code(ResponseCode::AppendUid {
                uid_validity: data.uid_validity,
                uid: data.uid,
            });
        }
        ctx.write_tagged(&status).await
    }
}
