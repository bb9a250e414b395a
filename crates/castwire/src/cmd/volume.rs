use crate::cmd::session::Session;
use crate::cmd::VolumeArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_receiver_status, OutputFormat};

pub async fn run(args: VolumeArgs, format: OutputFormat) -> CliResult<i32> {
    let session = Session::open(&args.device).await?;
    let receiver = session.receiver();
    let result = match args.level {
        Some(level) => session.run("volume", receiver.set_volume(level)).await,
        None => session.run("volume", receiver.set_muted(args.mute)).await,
    };
    session.close().await;

    print_receiver_status(&result?, format);
    Ok(SUCCESS)
}
