//! Newline-delimited JSON-RPC over stdin/stdout.

use std::io;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::errors::PARSE_ERROR_CODE;
use crate::mcp::{rpc::json_rpc_error, server::McpServer};

pub async fn run_stdio(server: McpServer) -> io::Result<()> {
    info!("serving mcp over stdio");
    serve_lines(&server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Answers one line per message until the reader hits EOF. Lines are handled as raw
/// bytes, so invalid UTF-8 is a parse error for that line only.
pub async fn serve_lines<R, W>(server: &McpServer, mut reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if line.trim_ascii().is_empty() {
            continue;
        }

        let response = match serde_json::from_slice::<Value>(&line) {
            Ok(payload) => server.handle_payload(payload).await,
            Err(err) => {
                warn!(error = %err, "unparseable stdio message");
                Some(json_rpc_error(None, PARSE_ERROR_CODE, "Parse error"))
            }
        };

        if let Some(response) = response {
            writer.write_all(response.to_string().as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    info!("stdin closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mcp::server::create_server;

    fn server() -> McpServer {
        let config = Config::from_lookup(|_| None).expect("default config");
        create_server(&config, &Default::default(), reqwest::Client::new())
    }

    async fn exchange(input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        serve_lines(&server(), input.as_bytes(), &mut output)
            .await
            .expect("stdio loop");

        String::from_utf8(output)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[tokio::test]
    async fn answers_requests_and_skips_notifications() {
        let responses = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["result"]["tools"][0]["name"], "fetch");
    }

    #[tokio::test]
    async fn unparseable_line_gets_parse_error() {
        let responses = exchange("not json\n").await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert!(responses[0]["id"].is_null());
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_end_the_session() {
        let input: &[u8] = b"\xff\xfe\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let mut output = Vec::new();
        serve_lines(&server(), input, &mut output)
            .await
            .expect("stdio loop survives invalid utf8");

        let responses: Vec<Value> = String::from_utf8(output)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], 1);
        assert!(responses[1].get("result").is_some());
    }

    #[tokio::test]
    async fn final_line_without_newline_is_answered() {
        let responses = exchange(r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#).await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 3);
    }

    #[tokio::test]
    async fn missing_token_tool_call_is_error_result() {
        let responses = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"fetch","arguments":{"url":"https://example.com"}}}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses[0]["result"]["isError"], true);
        let text = responses[0]["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        assert!(text.contains("JINA_TOKEN"));
    }
}
