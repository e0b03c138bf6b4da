//! CLOSE, UNSELECT, EXPUNGE, SEARCH, FETCH, STORE, COPY, MOVE.

use async_trait::async_trait;

use mailtide_proto::{
    FetchAttr, Flags, NumKind, ResponseCode, SearchKey, StatusResponse,
};

use crate::conn::CommandContext;
use crate::dispatch::CommandHandler;
use crate::error::{ServerError, ServerResult};
use crate::response::{ExpungeWriter, FetchWriter, MoveWriter};
use crate::session::{StoreOp, StoreRequest};
use crate::state::ConnState;

/// CLOSE (expunging) and UNSELECT (not).
pub struct CloseHandler {
    /// `true` expunges `\Deleted` messages on the way out.
    pub expunge: bool,
}

#[async_trait]
impl CommandHandler for CloseHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.expect_end()?;
        ctx.session().unselect(self.expunge).await?;
        ctx.conn.selected = None;
        ctx.conn.state.transition(ConnState::Authenticated)?;
        Ok(())
    }
}

/// EXPUNGE and UID EXPUNGE.
pub struct ExpungeHandler;

#[async_trait]
impl CommandHandler for ExpungeHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        let uids = if ctx.num_kind == NumKind::Uid {
            ctx.dec.read_sp()?;
            Some(ctx.dec.read_sequence_set(NumKind::Uid)?)
        } else {
            None
        };
        ctx.expect_end()?;
        require_read_write(ctx)?;
        let writer = ExpungeWriter::new(ctx.encoder());
        ctx.session().expunge(uids.as_ref(), &writer).await?;
        Ok(())
    }
}

/// SEARCH and UID SEARCH.
pub struct SearchHandler;

#[async_trait]
impl CommandHandler for SearchHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        if starts_with_keyword(ctx.dec.remaining(), b"CHARSET ") {
            let _ = ctx.dec.read_atom()?;
            ctx.dec.read_sp()?;
            let charset = ctx.read_astring().await?;
            if !charset.eq_ignore_ascii_case("UTF-8") && !charset.eq_ignore_ascii_case("US-ASCII")
            {
                return Err(ServerError::Status(
                    StatusResponse::no("unsupported charset")
                        .with_code(ResponseCode::BadCharset(vec![
                            "US-ASCII".to_string(),
                            "UTF-8".to_string(),
                        ])),
                ));
            }
            ctx.dec.read_sp()?;
        }
        let key = ctx.with_literals(SearchKey::decode_all).await?;
        ctx.expect_end()?;

        let kind = ctx.num_kind;
        let data = ctx.session().search(kind, &key).await?;
        let numbers = data.all.numbers(0);
        ctx.encoder()
            .send(|enc| {
                enc.star().atom("SEARCH");
                for n in &numbers {
                    enc.sp().number(*n);
                }
                enc.crlf();
            })
            .await?;
        Ok(())
    }
}

fn starts_with_keyword(remaining: &[u8], keyword: &[u8]) -> bool {
    remaining
        .get(..keyword.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
}

/// FETCH and UID FETCH.
pub struct FetchHandler;

#[async_trait]
impl CommandHandler for FetchHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let numbers = ctx.dec.read_sequence_set(ctx.num_kind)?;
        ctx.dec.read_sp()?;
        let mut attrs = FetchAttr::decode_items(&mut ctx.dec)?;
        ctx.expect_end()?;

        // UID FETCH implicitly returns the UID.
        if ctx.num_kind == NumKind::Uid && !attrs.contains(&FetchAttr::Uid) {
            attrs.push(FetchAttr::Uid);
        }
        let writer = FetchWriter::new(ctx.encoder());
        ctx.session().fetch(&numbers, &attrs, &writer).await?;
        Ok(())
    }
}

/// STORE and UID STORE.
pub struct StoreHandler;

#[async_trait]
impl CommandHandler for StoreHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let numbers = ctx.dec.read_sequence_set(ctx.num_kind)?;
        ctx.dec.read_sp()?;

        let mut unchanged_since = None;
        if ctx.dec.peek_byte() == Some(b'(') {
            ctx.dec.expect_byte(b'(')?;
            let modifier = ctx.dec.read_atom()?;
            if !modifier.eq_ignore_ascii_case("UNCHANGEDSINCE") {
                return Err(ServerError::bad(format!(
                    "unknown STORE modifier {modifier}"
                )));
            }
            ctx.dec.read_sp()?;
            unchanged_since = Some(ctx.dec.read_number64()?);
            ctx.dec.expect_byte(b')')?;
            ctx.dec.read_sp()?;
        }

        let op_atom = ctx.dec.read_atom()?.to_ascii_uppercase();
        let (op_name, silent) = match op_atom.strip_suffix(".SILENT") {
            Some(stripped) => (stripped.to_string(), true),
            None => (op_atom, false),
        };
        let op = match op_name.as_str() {
            "FLAGS" => StoreOp::Set,
            "+FLAGS" => StoreOp::Add,
            "-FLAGS" => StoreOp::Remove,
            other => {
                return Err(ServerError::bad(format!("unknown STORE operation {other}")));
            }
        };
        ctx.dec.read_sp()?;
        let flags = if ctx.dec.peek_byte() == Some(b'(') {
            ctx.dec.read_flags()?
        } else {
            let mut flags = Flags::new();
            loop {
                flags.insert(ctx.dec.read_flag()?);
                if !ctx.dec.maybe_sp() {
                    break;
                }
            }
            flags
        };
        ctx.expect_end()?;
        require_read_write(ctx)?;

        let request = StoreRequest {
            op,
            silent,
            flags,
            unchanged_since,
        };
        let writer = FetchWriter::new(ctx.encoder());
        ctx.session().store(&numbers, &request, &writer).await?;
        Ok(())
    }
}

/// COPY and UID COPY.
pub struct CopyHandler;

#[async_trait]
impl CommandHandler for CopyHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let numbers = ctx.dec.read_sequence_set(ctx.num_kind)?;
        ctx.dec.read_sp()?;
        let dest = ctx.read_mailbox().await?;
        ctx.expect_end()?;

        let data = ctx.session().copy(&numbers, &dest).await?;
        let mut status = StatusResponse::ok("COPY completed");
        if data.has_uids() {
            status = status.with_code(ResponseCode::CopyUid {
                uid_validity: data.uid_validity,
                source_uids: data.source_uids,
                dest_uids: data.dest_uids,
            });
        }
        ctx.write_tagged(&status).await
    }
}

/// MOVE and UID MOVE; probed against the session's MOVE capability.
pub struct MoveHandler;

#[async_trait]
impl CommandHandler for MoveHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.dec.read_sp()?;
        let numbers = ctx.dec.read_sequence_set(ctx.num_kind)?;
        ctx.dec.read_sp()?;
        let dest = ctx.read_mailbox().await?;
        ctx.expect_end()?;
        require_read_write(ctx)?;

        let writer = MoveWriter::new(ctx.encoder());
        let Some(session) = ctx.session().as_move() else {
            return Err(ServerError::no("MOVE not supported"));
        };
        session.move_messages(&numbers, &dest, &writer).await?;

        let mut status = StatusResponse::ok("MOVE completed");
        if let Some(data) = writer.take_copy_data()
            && data.has_uids()
        {
            status = status.with_code(ResponseCode::CopyUid {
                uid_validity: data.uid_validity,
                source_uids: data.source_uids,
                dest_uids: data.dest_uids,
            });
        }
        ctx.write_tagged(&status).await
    }
}

/// Mutating message commands require a read-write selection.
fn require_read_write(ctx: &CommandContext<'_>) -> ServerResult<()> {
    match ctx.conn.selected.as_ref() {
        Some(selected) if selected.read_only => Err(ServerError::Status(
            StatusResponse::no("mailbox is read-only").with_code(ResponseCode::ReadOnly),
        )),
        _ => Ok(()),
    }
}
