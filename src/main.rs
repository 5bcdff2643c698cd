use responds::{
    HandlerError, HttpError, Reply, Request, RequestBody, Route, Router, Server, ServerConfig,
};
use std::future::Future;

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Hello,
    Echo,
    Teapot,
}

struct Demo;

impl Router for Demo {
    type Handler = Endpoint;

    fn route(&self, request: &Request) -> Route<Endpoint> {
        match (request.method.as_slice(), request.path()) {
            (b"GET" | b"HEAD", b"/") => Route::Found(Endpoint::Hello),
            (b"POST" | b"PUT", b"/echo") => Route::Found(Endpoint::Echo),
            (b"GET", b"/teapot") => Route::Found(Endpoint::Teapot),
            (_, b"/" | b"/echo" | b"/teapot") => Route::MethodNotAllowed,
            _ => Route::NotFound,
        }
    }

    fn invoke<'a>(
        &'a self,
        handler: &'a Endpoint,
        _request: &'a Request,
        mut body: RequestBody<'a>,
    ) -> impl Future<Output = Result<Reply, HandlerError>> + Send + 'a {
        async move {
            match handler {
                Endpoint::Hello => Ok(Reply::text(200, "Hello from responds\n")),
                Endpoint::Echo => {
                    let body = body.read_all().await?;
                    Ok(Reply::new(200)
                        .with_header("Content-Type", "application/octet-stream")
                        .with_body(body))
                }
                Endpoint::Teapot => Err(HttpError::new(418, "short and stout").into()),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = ServerConfig::from_env()?;
    let server = Server::new(config, Demo);

    tokio::select! {
        res = server.run() => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
