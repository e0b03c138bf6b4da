//! CAPABILITY, NOOP, CHECK, LOGOUT.

use async_trait::async_trait;

use mailtide_proto::StatusResponse;

use crate::conn::CommandContext;
use crate::dispatch::CommandHandler;
use crate::error::ServerResult;
use crate::response::UpdateWriter;
use crate::state::ConnState;

/// CAPABILITY: advertise what this connection can do right now.
pub struct CapabilityHandler;

#[async_trait]
impl CommandHandler for CapabilityHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.expect_end()?;
        let caps = ctx.conn().capabilities();
        ctx.encoder()
            .send(|enc| {
                enc.star().atom("CAPABILITY");
                for cap in &caps {
                    enc.sp().atom(&cap.to_string());
                }
                enc.crlf();
            })
            .await?;
        Ok(())
    }
}

/// NOOP: a window for the backend to emit pending updates.
pub struct NoopHandler;

#[async_trait]
impl CommandHandler for NoopHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.expect_end()?;
        let writer = UpdateWriter::new(ctx.encoder());
        ctx.session().poll(&writer, true).await?;
        Ok(())
    }
}

/// CHECK: a checkpoint; like NOOP but without expunge-style updates.
pub struct CheckHandler;

#[async_trait]
impl CommandHandler for CheckHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.expect_end()?;
        let writer = UpdateWriter::new(ctx.encoder());
        ctx.session().poll(&writer, false).await?;
        Ok(())
    }
}

/// LOGOUT: untagged BYE, then the terminal state.
pub struct LogoutHandler;

#[async_trait]
impl CommandHandler for LogoutHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.expect_end()?;
        ctx.encoder()
            .send_status(None, &StatusResponse::bye("logging out"))
            .await?;
        ctx.conn().state_machine().transition(ConnState::Logout)?;
        Ok(())
    }
}
