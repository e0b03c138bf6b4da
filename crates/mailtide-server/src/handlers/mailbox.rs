//! SELECT, EXAMINE, CREATE, DELETE, RENAME, SUBSCRIBE, UNSUBSCRIBE,
//! LIST, STATUS.

use async_trait::async_trait;

use mailtide_proto::{ResponseCode, StatusAttr, StatusResponse};

use crate::conn::{CommandContext, SelectedMailbox};
use crate::dispatch::CommandHandler;
use crate::error::{ServerError, ServerResult};
use crate::response::{ListWriter, write_status_data};
use crate::session::ListOptions;
use crate::state::ConnState;

/// SELECT and EXAMINE (read-only).
pub struct SelectHandler {
    /// `true` for EXAMINE.
    pub read_only: bool,
}

#[async_trait]
impl CommandHandler for SelectHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let mailbox = ctx.read_mailbox().await?;
        ctx.expect_end()?;

        let was_selected = ctx.conn.selected.is_some();
        let data = if self.read_only {
            ctx.session().examine(&mailbox).await?
        } else {
            ctx.session().select(&mailbox).await?
        };
        let read_only = self.read_only || data.read_only;

        let enc = ctx.encoder();
        if was_selected {
            // Re-select: the previous mailbox is gone before any data for
            // the new one.
            enc.send_status(
                None,
                &StatusResponse::ok("previous mailbox is now closed")
                    .with_code(ResponseCode::Closed),
            )
            .await?;
        }
        enc.send(|e| {
            e.star().atom("FLAGS").sp().flags(&data.flags).crlf();
        })
        .await?;
        enc.send(|e| {
            e.num_response(data.num_messages, "EXISTS").crlf();
        })
        .await?;
        enc.send(|e| {
            e.num_response(data.num_recent, "RECENT").crlf();
        })
        .await?;
        if let Some(unseen) = data.unseen {
            enc.send_status(
                None,
                &StatusResponse::ok("first unseen message")
                    .with_code(ResponseCode::Unseen(unseen)),
            )
            .await?;
        }
        enc.send_status(
            None,
            &StatusResponse::ok("flags permitted")
                .with_code(ResponseCode::PermanentFlags(data.permanent_flags.clone())),
        )
        .await?;
        enc.send_status(
            None,
            &StatusResponse::ok("predicted next UID")
                .with_code(ResponseCode::UidNext(data.uid_next)),
        )
        .await?;
        enc.send_status(
            None,
            &StatusResponse::ok("UIDs valid")
                .with_code(ResponseCode::UidValidity(data.uid_validity)),
        )
        .await?;

        ctx.conn.state.transition(ConnState::Selected)?;
        ctx.conn.selected = Some(SelectedMailbox {
            mailbox,
            read_only,
        });

        let code = if read_only {
            ResponseCode::ReadOnly
        } else {
            ResponseCode::ReadWrite
        };
        let name = ctx.name.clone();
        ctx.write_tagged(&StatusResponse::ok(format!("{name} completed")).with_code(code))
            .await
    }
}

/// CREATE.
pub struct CreateHandler;

#[async_trait]
impl CommandHandler for CreateHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let mailbox = ctx.read_mailbox().await?;
        ctx.expect_end()?;
        if mailbox.is_inbox() {
            return Err(ServerError::Status(
                StatusResponse::no("INBOX always exists").with_code(ResponseCode::AlreadyExists),
            ));
        }
        ctx.session().create(&mailbox).await?;
        Ok(())
    }
}

/// DELETE.
pub struct DeleteHandler;

#[async_trait]
impl CommandHandler for DeleteHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let mailbox = ctx.read_mailbox().await?;
        ctx.expect_end()?;
        if mailbox.is_inbox() {
            return Err(ServerError::Status(
                StatusResponse::no("INBOX cannot be deleted").with_code(ResponseCode::Cannot),
            ));
        }
        ctx.session().delete(&mailbox).await?;
        Ok(())
    }
}

/// RENAME.
pub struct RenameHandler;

#[async_trait]
impl CommandHandler for RenameHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let from = ctx.read_mailbox().await?;
        ctx.dec.read_sp()?;
        let to = ctx.read_mailbox().await?;
        ctx.expect_end()?;
        ctx.session().rename(&from, &to).await?;
        Ok(())
    }
}

/// SUBSCRIBE.
pub struct SubscribeHandler;

#[async_trait]
impl CommandHandler for SubscribeHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let mailbox = ctx.read_mailbox().await?;
        ctx.expect_end()?;
        ctx.session().subscribe(&mailbox).await?;
        Ok(())
    }
}

/// UNSUBSCRIBE.
pub struct UnsubscribeHandler;

#[async_trait]
impl CommandHandler for UnsubscribeHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let mailbox = ctx.read_mailbox().await?;
        ctx.expect_end()?;
        ctx.session().unsubscribe(&mailbox).await?;
        Ok(())
    }
}

/// LIST, including multiple patterns and RETURN options.
pub struct ListHandler;

#[async_trait]
impl CommandHandler for ListHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let reference = ctx.read_astring().await?;
        ctx.dec.read_sp()?;

        let patterns = if ctx.dec.peek_byte() == Some(b'(') {
            let mut patterns = Vec::new();
            ctx.dec.expect_byte(b'(')?;
            loop {
                patterns.push(ctx.read_list_pattern().await?);
                if !ctx.dec.maybe_sp() {
                    break;
                }
            }
            ctx.dec.expect_byte(b')')?;
            patterns
        } else {
            vec![ctx.read_list_pattern().await?]
        };

        let mut options = ListOptions::default();
        if ctx.dec.maybe_sp() {
            let keyword = ctx.dec.read_atom()?;
            if !keyword.eq_ignore_ascii_case("RETURN") {
                return Err(ServerError::bad("expected RETURN in LIST options"));
            }
            ctx.dec.read_sp()?;
            parse_return_options(ctx, &mut options)?;
        }
        ctx.expect_end()?;

        let writer = ListWriter::new(ctx.encoder());
        ctx.session()
            .list(&reference, &patterns, &options, &writer)
            .await?;
        Ok(())
    }
}

fn parse_return_options(
    ctx: &mut CommandContext<'_>,
    options: &mut ListOptions,
) -> ServerResult<()> {
    ctx.dec.expect_byte(b'(')?;
    if ctx.dec.peek_byte() == Some(b')') {
        ctx.dec.expect_byte(b')')?;
        return Ok(());
    }
    loop {
        let option = ctx.dec.read_atom()?.to_ascii_uppercase();
        match option.as_str() {
            "SUBSCRIBED" => options.return_subscribed = true,
            "CHILDREN" => options.return_children = true,
            "STATUS" => {
                ctx.dec.read_sp()?;
                options.return_status = Some(StatusAttr::decode_list(&mut ctx.dec)?);
            }
            other => {
                return Err(ServerError::bad(format!("unknown LIST return option {other}")));
            }
        }
        if !ctx.dec.maybe_sp() {
            break;
        }
    }
    ctx.dec.expect_byte(b')')?;
    Ok(())
}

/// STATUS.
pub struct StatusHandler;

#[async_trait]
impl CommandHandler for StatusHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let mailbox = ctx.read_mailbox().await?;
        ctx.dec.read_sp()?;
        let items = StatusAttr::decode_list(&mut ctx.dec)?;
        ctx.expect_end()?;
        let data = ctx.session().status(&mailbox, &items).await?;
        write_status_data(&ctx.encoder(), &mailbox, &data).await?;
        Ok(())
    }
}
