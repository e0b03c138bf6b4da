//! IDLE (RFC 2177): cooperative suspension until DONE.

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::timeout;

use mailtide_proto::StatusResponse;

use crate::conn::{CommandContext, read_wire_line};
use crate::dispatch::CommandHandler;
use crate::error::{ServerError, ServerResult};
use crate::response::UpdateWriter;

/// IDLE: continuation request, then suspend the session on a stop signal
/// while a watcher waits for the client's DONE line.
pub struct IdleHandler;

#[async_trait]
impl CommandHandler for IdleHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.expect_end()?;
        let enc = ctx.encoder();
        enc.continuation("idling").await?;

        let idle_timeout = ctx.conn.shared.config.idle_timeout;
        let max_len = ctx.conn.shared.config.max_line_length;
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let writer = UpdateWriter::new(ctx.encoder());

        let conn = &mut *ctx.conn;
        let reader = conn.reader.as_mut().ok_or(ServerError::Closed)?;
        let session = conn.session.as_mut();

        let idle_fut = session.idle(&writer, &mut stop_rx);
        tokio::pin!(idle_fut);
        let mut idle_result: Option<Result<(), StatusResponse>> = None;

        let outcome: ServerResult<()> = loop {
            tokio::select! {
                res = &mut idle_fut, if idle_result.is_none() => {
                    // Session returned early (e.g. backend shutdown); we
                    // still owe the client a response to DONE.
                    idle_result = Some(res);
                }
                read = timeout(idle_timeout, read_wire_line(reader, max_len)) => match read {
                    Err(_) => {
                        // Keep the connection visibly alive through NATs.
                        if enc
                            .send_status(None, &StatusResponse::ok("still idling"))
                            .await
                            .is_err()
                        {
                            break Err(ServerError::Closed);
                        }
                    }
                    Ok(Ok(line)) => {
                        let trimmed: Vec<u8> = line
                            .iter()
                            .copied()
                            .filter(|&b| b != b'\r' && b != b'\n')
                            .collect();
                        if trimmed.eq_ignore_ascii_case(b"DONE") {
                            break Ok(());
                        }
                        break Err(ServerError::bad("expected DONE to end IDLE"));
                    }
                    Ok(Err(err)) => break Err(err),
                }
            }
        };

        let _ = stop_tx.send(true);
        let idle_result = match idle_result {
            Some(result) => result,
            None => idle_fut.await,
        };

        outcome?;
        idle_result?;
        Ok(())
    }
}
