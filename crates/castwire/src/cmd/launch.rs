use tracing::info;

use crate::cmd::session::Session;
use crate::cmd::LaunchArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_receiver_status, OutputFormat};

pub async fn run(args: LaunchArgs, format: OutputFormat) -> CliResult<i32> {
    let session = Session::open(&args.device).await?;
    let result = session
        .run("launch", session.receiver().launch(&args.app_id))
        .await;
    session.close().await;

    let status = result?;
    if let Some(app) = status.application(&args.app_id) {
        info!(
            app_id = %args.app_id,
            session_id = app.session_id.as_deref().unwrap_or("-"),
            "application running"
        );
    }
    print_receiver_status(&status, format);
    Ok(SUCCESS)
}
