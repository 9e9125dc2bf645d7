//! Newline-delimited JSON transport
//!
//! Each input line is a call `{"id": .., "path": "metrics.query", "input": {..}}`;
//! each output line is `{"id": .., "result": ..}` or `{"id": .., "error": ..}`.
//! Calls run concurrently, so replies may arrive out of order and are matched
//! by `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use ticket_metrics::rpc::{CompiledRouter, RpcError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::rpc::AppContext;

/// Replies buffered ahead of the writer
const REPLY_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
struct Call {
    #[serde(default)]
    id: Value,
    path: String,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Reply {
    Ok { id: Value, result: Value },
    Err { id: Value, error: RpcError },
}

impl Reply {
    fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            warn!(error = %e, "failed to encode reply");
            r#"{"id":null,"error":{"code":"SERIALIZATION_ERROR","message":"failed to encode reply"}}"#
                .to_string()
        })
    }
}

/// Handle a single line and return the encoded reply.
pub async fn handle_line(router: &CompiledRouter<AppContext>, line: &str) -> String {
    let call: Call = match serde_json::from_str(line) {
        Ok(call) => call,
        Err(e) => {
            debug!(error = %e, "malformed call");
            return Reply::Err {
                id: Value::Null,
                error: RpcError::bad_request(format!("malformed call: {}", e)),
            }
            .encode();
        }
    };

    let reply = match router.call(&call.path, call.input).await {
        Ok(result) => Reply::Ok {
            id: call.id,
            result,
        },
        Err(error) => Reply::Err { id: call.id, error },
    };
    reply.encode()
}

/// Serve calls from `reader` until it is exhausted, writing replies to `writer`.
pub async fn serve<R, W>(
    router: Arc<CompiledRouter<AppContext>>,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel::<String>(REPLY_BUFFER);
    let mut lines = reader.lines();

    let reading = async move {
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let router = router.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = handle_line(&router, &line).await;
                let _ = tx.send(reply).await;
            });
        }
        Ok::<_, std::io::Error>(())
    };

    let writing = async move {
        while let Some(reply) = rx.recv().await {
            writer.write_all(reply.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    };

    let (read, written) = tokio::join!(reading, writing);
    read?;
    written
}
