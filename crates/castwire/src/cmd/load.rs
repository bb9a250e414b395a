use castwire_ctrl::{
    ConnectionController, CtrlError, LoadOptions, MediaController, MediaInfo, MediaStatus,
    StreamType,
};
use tracing::debug;

use crate::cmd::session::Session;
use crate::cmd::LoadArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_media_status, OutputFormat};

pub async fn run(args: LoadArgs, format: OutputFormat) -> CliResult<i32> {
    let session = Session::open(&args.device).await?;
    let result = session.run("load", load(&session, &args)).await;
    session.close().await;

    print_media_status(&result?, format);
    Ok(SUCCESS)
}

async fn load(session: &Session, args: &LoadArgs) -> castwire_ctrl::Result<Vec<MediaStatus>> {
    let status = session.receiver().launch(&args.app_id).await?;
    let transport_id = status
        .application(&args.app_id)
        .and_then(|app| app.transport_id.clone())
        .ok_or_else(|| {
            CtrlError::LaunchFailed(format!("{} reported no transport id", args.app_id))
        })?;
    debug!(app_id = %args.app_id, %transport_id, "media receiver ready");

    // The application listens on its own transport id and needs its own
    // virtual connection before it accepts media commands.
    let app = ConnectionController::new(session.connection(), session.sender_id(), &transport_id);
    app.connect().await?;

    let media = MediaController::with_options(
        session.connection(),
        session.sender_id(),
        &transport_id,
        session.options(),
    );
    let options = LoadOptions {
        autoplay: true,
        ..LoadOptions::default()
    };
    media.load(&media_info(args), &options).await
}

fn media_info(args: &LoadArgs) -> MediaInfo {
    let mut info = MediaInfo::new(&args.url, &args.content_type);
    if let Some(title) = &args.title {
        info = info.with_title(title);
    }
    if args.live {
        info = info.with_stream_type(StreamType::Live);
    }
    info
}
