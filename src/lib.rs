/*!
 # srcds controller

 Keeps a fleet of Source dedicated game servers healthy.

 ## Overview

 The crate has two halves:

 - The **checker** probes every configured server on an interval, counts
   failures per (server, check) pair and runs remediation actions (`log`,
   `restart`, `notify`) when a limit is crossed. It can also restart
   containers that die, based on container runtime events.
 - The **runner** supervises one game server process on a
   pseudo-terminal. It forwards the output, accepts console commands on a
   Unix socket guarded by peer-credential ACLs, and pushes RCON password
   changes from its configuration file into the live server.

 ## Checker

 ```no_run
 use srcds_controller::checker::Checker;
 use srcds_controller::config::{validate_config, Config};
 use tokio_util::sync::CancellationToken;

 #[tokio::main]
 async fn main() -> srcds_controller::Result<()> {
     let config = Config::from_file("checker.yaml")?;
     validate_config(&config)?;

     let cancel = CancellationToken::new();
     let checker = Checker::with_defaults(config)?;
     checker.run(cancel).await
 }
 ```

 ## Sending a console command to a runner

 ```no_run
 use srcds_controller::channel::{CommandSender, UnixCommandClient};
 use srcds_controller::config::Config;

 # async fn demo() -> srcds_controller::Result<()> {
 let config = Config::from_file("checker.yaml")?;
 let server = config.server("alpha").expect("configured");
 UnixCommandClient::new().send_command(server, "say hello").await?;
 # Ok(())
 # }
 ```
*/

pub mod channel;
pub mod checker;
pub mod checks;
pub mod config;
pub mod error;
pub mod notify;
pub mod rcon;
pub mod runner;
pub mod runtime;

pub use checker::Checker;
pub use config::{Config, RunnerConfig};
pub use error::{Error, Result};
pub use runner::Runner;
