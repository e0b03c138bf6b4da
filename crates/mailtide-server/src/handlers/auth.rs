//! LOGIN, AUTHENTICATE, UNAUTHENTICATE, STARTTLS, ENABLE.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use mailtide_proto::{Capability, StatusResponse};

use crate::conn::CommandContext;
use crate::dispatch::CommandHandler;
use crate::error::{ServerError, ServerResult};
use crate::state::ConnState;

/// LOGIN with plaintext credentials.
pub struct LoginHandler;

#[async_trait]
impl CommandHandler for LoginHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let username = ctx.read_astring().await?;
        ctx.dec.read_sp()?;
        let password = ctx.read_astring().await?;
        ctx.expect_end()?;
        if !ctx.conn().auth_allowed() {
            return Err(ServerError::no("LOGIN is disabled until TLS is active"));
        }
        ctx.session().login(&username, &password).await?;
        ctx.conn().state_machine().transition(ConnState::Authenticated)?;
        debug!(user = %username, "login accepted");
        Ok(())
    }
}

/// AUTHENTICATE: the SASL exchange framing.
pub struct AuthenticateHandler;

#[async_trait]
impl CommandHandler for AuthenticateHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let mech_name = ctx.dec.read_atom()?;
        // SASL-IR: an initial response may ride on the command line.
        let mut response: Option<Vec<u8>> = if ctx.dec.maybe_sp() {
            let initial = ctx.dec.read_atom()?;
            if initial == "=" {
                Some(Vec::new())
            } else {
                Some(decode_base64(initial.as_bytes())?)
            }
        } else {
            None
        };
        ctx.expect_end()?;

        if !ctx.conn().auth_allowed() {
            return Err(ServerError::no(
                "AUTHENTICATE is disabled until TLS is active",
            ));
        }
        let Some(mut mech) = ctx.conn.shared.mechanisms.create(&mech_name) else {
            return Err(ServerError::no(format!(
                "unsupported authentication mechanism {mech_name}"
            )));
        };

        loop {
            let step = {
                let conn = &mut *ctx.conn;
                mech.step(conn.session.as_mut(), response.as_deref())
                    .await?
            };
            if step.done {
                break;
            }
            let challenge = BASE64.encode(step.challenge.unwrap_or_default());
            ctx.encoder().continuation(&challenge).await?;
            let line = ctx.conn.read_data_line().await?;
            if line == b"*" {
                return Err(ServerError::bad("authentication exchange cancelled"));
            }
            response = Some(decode_base64(&line)?);
        }

        ctx.conn().state_machine().transition(ConnState::Authenticated)?;
        debug!(mechanism = %mech_name, "authentication accepted");
        Ok(())
    }
}

fn decode_base64(line: &[u8]) -> ServerResult<Vec<u8>> {
    BASE64
        .decode(line)
        .map_err(|_| ServerError::bad("invalid base64 in authentication exchange"))
}

/// UNAUTHENTICATE (RFC 8437): return to the not-authenticated state.
pub struct UnauthenticateHandler;

#[async_trait]
impl CommandHandler for UnauthenticateHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.expect_end()?;
        ctx.session().unauthenticate().await?;
        let conn = ctx.conn();
        conn.selected = None;
        if conn.conn_state() == ConnState::Selected {
            conn.state_machine().transition(ConnState::Authenticated)?;
        }
        conn.state_machine()
            .transition(ConnState::NotAuthenticated)?;
        Ok(())
    }
}

/// STARTTLS: tagged OK first, then the in-place handshake.
pub struct StartTlsHandler;

#[async_trait]
impl CommandHandler for StartTlsHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.expect_end()?;
        if ctx.conn().is_tls() {
            return Err(ServerError::bad("TLS is already active"));
        }
        let Some(acceptor) = ctx.conn.shared.tls_acceptor.clone() else {
            return Err(ServerError::no("STARTTLS is not available"));
        };
        // The OK must reach the peer in plaintext, before the handshake.
        ctx.write_tagged(&StatusResponse::ok("Begin TLS negotiation now"))
            .await?;
        ctx.conn.upgrade_tls(acceptor).await?;
        Ok(())
    }
}

/// ENABLE (RFC 5161): opt in to extension capabilities.
pub struct EnableHandler;

#[async_trait]
impl CommandHandler for EnableHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        let mut accepted = Vec::new();
        while ctx.dec.maybe_sp() {
            let cap = Capability::parse(&ctx.dec.read_atom()?);
            if Self::enableable(ctx, &cap) {
                accepted.push(cap);
            }
        }
        ctx.expect_end()?;

        for cap in &accepted {
            ctx.conn.enabled.insert(cap.clone());
            if *cap == Capability::Utf8Accept {
                ctx.conn.utf8_accepted = true;
                ctx.conn.enc.set_utf8_accepted(true).await;
            }
            let conn_id = ctx.conn.id();
            for ext in &ctx.conn.shared.extensions {
                if ext.capabilities().contains(cap) {
                    ext.on_enabled(conn_id);
                }
            }
        }

        ctx.encoder()
            .send(|enc| {
                enc.star().atom("ENABLED");
                for cap in &accepted {
                    enc.sp().atom(&cap.to_string());
                }
                enc.crlf();
            })
            .await?;
        Ok(())
    }
}

impl EnableHandler {
    /// Only advertised, opt-in capabilities may be enabled.
    fn enableable(ctx: &CommandContext<'_>, cap: &Capability) -> bool {
        if !ctx.conn.shared.caps.contains(cap) {
            return false;
        }
        *cap == Capability::Utf8Accept
            || ctx
                .conn
                .shared
                .extensions
                .iter()
                .any(|ext| ext.capabilities().contains(cap))
    }
}
