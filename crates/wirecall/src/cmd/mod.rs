use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the built-in demo services (Echo.Ping, Arith.Add, Arith.Mul).
    Serve(ServeArgs),
    /// Make one call and print the reply.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Network to listen on: tcp, tcp4, tcp6 or unix.
    #[arg(long, default_value = "tcp")]
    pub network: String,
    /// Address to bind (host:port, or a socket path for unix).
    #[arg(long)]
    pub addr: String,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Target in `Service.Method` form.
    pub target: String,
    /// Network to dial: tcp, tcp4, tcp6 or unix.
    #[arg(long, default_value = "tcp")]
    pub network: String,
    /// Server address (host:port, or a socket path for unix).
    #[arg(long)]
    pub addr: String,
    /// JSON arguments.
    #[arg(long, default_value = "null")]
    pub json: String,
    /// Per-call timeout, also advertised to the server (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
