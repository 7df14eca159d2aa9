//! Spec: a full stdio session (initialize, list tools, call one) over
//! the line-delimited transport.

use crate::prelude::*;
use cdx_server::rpc;

#[tokio::test]
async fn full_session_over_the_wire() {
    let world = World::with_agent(COMPLETING_AGENT);

    let input = concat!(
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
        "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n",
        "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\",\"params\":{\"name\":\"local_run\",\"arguments\":{\"task\":\"say hello\",\"mode\":\"read-only\"}}}\n",
    );

    let mut output = Vec::new();
    rpc::serve(input.as_bytes(), &mut output, |request| {
        world.dispatcher.handle(request)
    })
    .await
    .unwrap();

    let responses: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    // The notification produced no frame: three responses for four lines.
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "cdx");
    assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 14);

    let call = &responses[2]["result"];
    let text = call["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("completed"), "{text}");
    assert!(call["isError"].as_bool() != Some(true));
}

#[tokio::test]
async fn every_response_is_a_single_text_block() {
    let world = World::with_agent(COMPLETING_AGENT);
    for (tool, args) in [
        ("local_status", serde_json::json!({})),
        ("cloud_status", serde_json::json!({})),
        (
            "cloud_github_setup",
            serde_json::json!({"repo_url": "https://github.com/acme/api.git"}),
        ),
    ] {
        let request = cdx_server::rpc::RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(serde_json::json!(9)),
            method: "tools/call".into(),
            params: Some(serde_json::json!({"name": tool, "arguments": args})),
        };
        let response = world.dispatcher.handle(request).await.unwrap();
        let content = response.result.unwrap()["content"].clone();
        let blocks = content.as_array().unwrap();
        assert_eq!(blocks.len(), 1, "{tool} returned {} blocks", blocks.len());
        assert_eq!(blocks[0]["type"], "text");
    }
}
