
use helper::{read_response, read_until_closed, start, test_config, TestRouter};
use responds::{Environment, Reply, Server, ShutdownOutcome};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_get_x_example() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();

    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-length"), Some("2"));
    assert_eq!(response.header("server"), Some("responds-test"));
    assert!(response.header("date").is_some());
    assert_eq!(response.header("connection"), None);
    assert_eq!(response.body, b"ok");

    // closing our side between requests ends the connection without a reply
    client.shutdown().await.unwrap();
    assert!(read_until_closed(&mut client).await.is_empty());
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_keep_alive_serves_several_requests() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    let mut buf = Vec::new();
    for _ in 0..3 {
        client
            .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n")
            .await
            .unwrap();
        let response = read_response(&mut client, &mut buf, false).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"ok");
    }

    // back to back in a single write
    client
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\nPOST /echo HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\n\r\nabc")
        .await
        .unwrap();
    assert_eq!(read_response(&mut client, &mut buf, false).await.body, b"ok");
    assert_eq!(read_response(&mut client, &mut buf, false).await.body, b"abc");

    client.shutdown().await.unwrap();
    assert!(read_until_closed(&mut client).await.is_empty());
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_connection_close_ends_after_one_response() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\nGET /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();

    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("connection"), Some("close"));
    // the second request is never answered
    assert!(buf.is_empty());
    assert!(read_until_closed(&mut client).await.is_empty());

    drop(client);
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_header_timeout_sends_408_and_closes() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client.write_all(b"GET /x HTTP/1.1\r\nHo").await.unwrap();

    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 408);
    assert_eq!(response.header("connection"), Some("close"));
    assert_eq!(response.body, b"request timeout");
    assert!(read_until_closed(&mut client).await.is_empty());

    drop(client);
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 408);
    drop(client);
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_ignored_body_is_drained() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"POST /ignore HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"ignored");

    client
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"ok");

    client.shutdown().await.unwrap();
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_second_body_stream_is_refused() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"POST /twice HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\nbody")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"already consumed");
}

#[tokio::test]
async fn test_unknown_method_gets_405_and_close() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"FROB /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 405);
    assert_eq!(response.header("connection"), Some("close"));
    assert!(read_until_closed(&mut client).await.is_empty());
    drop(client);
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_garbage_gets_400_and_close() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"this is not http\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body, b"bad request");
    assert!(read_until_closed(&mut client).await.is_empty());
    drop(client);
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_routing_errors_keep_the_connection() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    let mut buf = Vec::new();

    client
        .write_all(b"GET /nowhere HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 404);
    assert_eq!(response.body, b"not found");

    client
        .write_all(b"DELETE /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 405);

    client
        .write_all(b"GET /teapot HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 418);

    client
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    assert_eq!(read_response(&mut client, &mut buf, false).await.status, 200);
}

#[tokio::test]
async fn test_handler_failure_is_500() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"GET /fail HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body, b"internal server error");

    // informational statuses can't be a handler's answer
    client
        .write_all(b"GET /informational HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    assert_eq!(read_response(&mut client, &mut buf, false).await.status, 500);
}

#[tokio::test]
async fn test_dev_environment_shows_error_detail() {
    let config = test_config().with_environment(Environment::Dev);
    let (mut client, _handle) = start(TestRouter::default(), config);
    client
        .write_all(b"GET /fail HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body, b"kaboom");
}

#[tokio::test]
async fn test_custom_error_handler() {
    let router = TestRouter::default().with_error_handler(404, |error| {
        Reply::text(error.status, "nothing here").with_header("X-Custom", "yes")
    });
    let (mut client, _handle) = start(router, test_config());
    client
        .write_all(b"GET /missing HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 404);
    assert_eq!(response.header("x-custom"), Some("yes"));
    assert_eq!(response.body, b"nothing here");
}

#[tokio::test]
async fn test_expect_100_continue() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"POST /echo HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 100);
    assert!(response.body.is_empty());

    client.write_all(b"hello").await.unwrap();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"hello");
}

#[tokio::test]
async fn test_chunked_request_body() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    client
        .write_all(
            b"POST /chunks HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"5,6");
}

#[tokio::test]
async fn test_head_response_has_no_body() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"HEAD /x HTTP/1.1\r\nHost: h\r\n\r\nGET /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, true).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-length"), Some("2"));

    // the next response starts right after the head
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.body, b"ok");
}

#[tokio::test]
async fn test_stalled_body_times_out() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"POST /echo HTTP/1.1\r\nHost: h\r\nContent-Length: 10\r\n\r\nabc")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 408);
    assert_eq!(response.header("connection"), Some("close"));
    assert!(read_until_closed(&mut client).await.is_empty());
    drop(client);
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_oversized_head_gets_431() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    let mut request = b"GET /x HTTP/1.1\r\nHost: h\r\nX-Big: ".to_vec();
    request.extend(std::iter::repeat(b'a').take(20 * 1024));
    client.write_all(&request).await.unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 431);
}

#[tokio::test]
async fn test_request_trickling_in_byte_by_byte() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    for byte in b"POST /echo HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\nabcd" {
        client.write_all(&[*byte]).await.unwrap();
        tokio::task::yield_now().await;
    }
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"abcd");
}

#[tokio::test]
async fn test_drain_timeout_forces_reset() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    assert_eq!(read_response(&mut client, &mut buf, false).await.status, 200);
    // keep the pipe open and never finish our side
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::ForcedReset);
    drop(client);
}

#[tokio::test]
async fn test_server_over_tcp() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(test_config(), TestRouter::default());
    tokio::spawn(server.serve(listener));

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut buf = Vec::new();
    for _ in 0..2 {
        client
            .write_all(b"POST /echo HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\nping")
            .await
            .unwrap();
        let response = read_response(&mut client, &mut buf, false).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"ping");
    }

    client
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.header("connection"), Some("close"));
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    // a second client gets its own connection
    let mut other = tokio::net::TcpStream::connect(addr).await.unwrap();
    other
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    assert_eq!(read_response(&mut other, &mut buf, false).await.body, b"ok");
}

#[tokio::test]
async fn test_reply_with_bad_framing_becomes_500() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    let mut buf = Vec::new();

    client
        .write_all(b"GET /wrong-length HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body, b"internal server error");

    client
        .write_all(b"GET /self-chunked HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.header("transfer-encoding"), None);

    // nothing was written for the rejected replies, so the connection lives on
    client
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    assert_eq!(read_response(&mut client, &mut buf, false).await.body, b"ok");
}

#[tokio::test]
async fn test_head_reply_may_declare_any_length() {
    let (mut client, _handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"HEAD /wrong-length HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, true).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-length"), Some("10"));
}

#[tokio::test]
async fn test_ignored_body_is_drained_before_closing_reply() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"POST /ignore HTTP/1.1\r\nHost: h\r\nConnection: close\r\nContent-Length: 10\r\n\r\nabc")
        .await
        .unwrap();

    // the response waits for the rest of the upload
    let mut early = [0u8; 64];
    assert!(
        tokio::time::timeout(Duration::from_millis(100), client.read(&mut early))
            .await
            .is_err()
    );

    client.write_all(b"defghij").await.unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"ignored");
    assert_eq!(response.header("connection"), Some("close"));
    assert!(read_until_closed(&mut client).await.is_empty());

    drop(client);
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_swallowed_body_error_closes_connection() {
    let (mut client, handle) = start(TestRouter::default(), test_config());
    client
        .write_all(b"POST /swallow HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let response = read_response(&mut client, &mut buf, false).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"swallowed");
    assert_eq!(response.header("connection"), Some("close"));
    assert!(read_until_closed(&mut client).await.is_empty());

    drop(client);
    assert_eq!(handle.await.unwrap(), ShutdownOutcome::Graceful);
}
