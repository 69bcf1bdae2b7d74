use tracing::{error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ovn_cni::commands::run_cni;

fn main() {
    // Log to stderr; stdout is reserved for the single JSON reply.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match run_cni() {
        Ok(Some(payload)) => println!("{payload}"),
        Ok(None) => {}
        Err(err) => {
            error!(%err, "CNI invocation failed");
            let reply = err.reply();
            match serde_json::to_string(&reply) {
                Ok(json) => println!("{json}"),
                Err(_) => println!(
                    r#"{{"cniVersion":"0.1.0","code":{},"message":"{}"}}"#,
                    reply.code,
                    reply.message.replace('"', "\\\"")
                ),
            }
            std::process::exit(1);
        }
    }
}
