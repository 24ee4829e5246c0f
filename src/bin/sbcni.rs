use sbcni::commands::run_cni;
use sbcni::config::{LogConfig, DEFAULT_CNI_VERSION};
use sbcni::types::{ErrorReply, CODE_IO_FAILURE};
use sbcni::PinnedRuntime;
use tracing::error;

fn main() {
    // Logging goes to stderr or a file, stdout carries the CNI reply
    if let Err(err) = LogConfig::from_env().init() {
        eprintln!("sbcni: logging disabled: {err:#}");
    }

    let result = PinnedRuntime::new()
        .map_err(|e| ErrorReply::new(DEFAULT_CNI_VERSION, CODE_IO_FAILURE, e.to_string()))
        .and_then(|runtime| run_cni(&runtime));

    if let Err(reply) = result {
        error!(code = reply.code, "CNI plugin error: {}", reply.details_or_msg());
        if let Err(err) = reply.print() {
            eprintln!("sbcni: failed to write error reply: {err:#}");
        }
        std::process::exit(1);
    }
}
