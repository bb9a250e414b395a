use crate::cmd::session::Session;
use crate::cmd::StatusArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_receiver_status, OutputFormat};

pub async fn run(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    let session = Session::open(&args.device).await?;
    let result = session
        .run("status", session.receiver().get_status())
        .await;
    session.close().await;

    print_receiver_status(&result?, format);
    Ok(SUCCESS)
}
