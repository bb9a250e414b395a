use crate::cmd::session::Session;
use crate::cmd::StopArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_receiver_status, OutputFormat};

pub async fn run(args: StopArgs, format: OutputFormat) -> CliResult<i32> {
    let session = Session::open(&args.device).await?;
    let result = session
        .run("stop", session.receiver().stop(&args.session_id))
        .await;
    session.close().await;

    print_receiver_status(&result?, format);
    Ok(SUCCESS)
}
