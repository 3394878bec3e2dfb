use docker_image_mirror::cli::{Args, Runner};
use docker_image_mirror::logging::Logger;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match Args::parse_args().from_env().into_config() {
        Ok(config) => config,
        Err(e) => {
            Logger::new(false).error(&e.to_string());
            return ExitCode::from(e.exit_code());
        }
    };

    let runner = Runner::new(config);
    match runner.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            runner.output().error(&e.to_string());
            ExitCode::from(e.exit_code())
        }
    }
}
