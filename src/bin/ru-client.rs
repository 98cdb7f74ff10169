//! remote-unpack command line client
//!
//! Sends one request and prints every reply until the final one.
//!
//! ```bash
//! ru-client get /srv/incoming
//! ru-client --host nas.local unpack /srv/incoming/movie.rar
//! ```

use std::process::ExitCode;

use clap::Parser;

use remote_unpack::Error;
use remote_unpack::client::Client;
use remote_unpack::logging::init_tracing;
use remote_unpack::protocol::{DEFAULT_PROTOCOL_VERSION, Data, Message};

/// Remote unpack client
#[derive(Parser, Debug)]
#[command(name = "ru-client", version)]
#[command(about = "Send one request to a remote-unpack server")]
struct Args {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 1337)]
    port: u16,

    /// Protocol version to declare
    #[arg(long, default_value = DEFAULT_PROTOCOL_VERSION)]
    protocol: String,

    /// Method: get or unpack
    #[arg(default_value = "get")]
    method: String,

    /// Directory to list or archive to unpack
    #[arg(default_value = ".")]
    path: String,
}

fn print_reply(reply: &Message) {
    match (reply.code.as_str(), &reply.data) {
        ("206", Data::Text(progress)) => println!("{progress}"),
        (_, Data::Text(text)) if !text.is_empty() => {
            println!("{} {}: {text}", reply.code, reply.phrase)
        }
        (_, Data::Entries(entries)) => {
            println!("{} {}", reply.code, reply.phrase);
            for entry in entries {
                println!("  {entry}");
            }
        }
        _ => println!("{} {}", reply.code, reply.phrase),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("warn");
    let args = Args::parse();

    let mut client = match Client::connect((args.host.as_str(), args.port), args.protocol).await {
        Ok(client) => client,
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            eprintln!("Server ({}:{}) refused connection", args.host, args.port);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Could not connect to {}:{}: {e}", args.host, args.port);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = client.request(&args.method, &args.path, print_reply) => match result {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Request failed: {e}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted, closing connection");
            ExitCode::SUCCESS
        }
    }
}
