use std::collections::HashMap;
use std::convert::Infallible;

use serde::Deserialize;
use wirecall_rpc::{RequestContext, Server, Service};
use wirecall_transport::Listener;

use crate::cmd::ServeArgs;
use crate::exit::{rpc_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

#[derive(Debug, Deserialize)]
struct Operands {
    a: i64,
    b: i64,
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let server = demo_server().map_err(|err| rpc_error("register failed", err))?;
    let listener = server
        .listen(&args.network, &args.addr)
        .map_err(|err| rpc_error("bind failed", err))?;
    let bound = listener.local_addr();

    install_ctrlc_handler(&listener)?;
    print_listening(&args.network, &bound, &server.services(), format);

    server
        .serve_listener(listener)
        .map_err(|err| rpc_error("serve failed", err))?;
    Ok(SUCCESS)
}

fn demo_server() -> wirecall_rpc::Result<Server> {
    let server = Server::new();
    let demo = HashMap::from([("kind".to_string(), "demo".to_string())]);

    server.register(
        Service::new("Echo").method("Ping", |ctx: &RequestContext, value: serde_json::Value| {
            tracing::debug!(seq = ctx.seq(), peer = ctx.peer(), "echo");
            Ok::<_, Infallible>(value)
        }),
        demo.clone(),
    )?;
    server.register(
        Service::new("Arith")
            .method("Add", |_: &RequestContext, ops: Operands| {
                ops.a.checked_add(ops.b).ok_or("integer overflow")
            })
            .method("Mul", |_: &RequestContext, ops: Operands| {
                ops.a.checked_mul(ops.b).ok_or("integer overflow")
            }),
        demo,
    )?;
    Ok(server)
}

fn install_ctrlc_handler(listener: &Listener) -> CliResult<()> {
    // The accept loop has no stop signal and exit skips drop, so the Unix
    // socket file is removed here.
    #[cfg(unix)]
    let cleanup = listener.socket_cleanup();
    #[cfg(not(unix))]
    let _ = listener;

    ctrlc::set_handler(move || {
        tracing::info!("interrupted; shutting down");
        #[cfg(unix)]
        {
            if let Some(cleanup) = &cleanup {
                cleanup.remove();
            }
        }
        std::process::exit(SUCCESS);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
