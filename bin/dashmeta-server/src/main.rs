mod server;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use dashmeta::{
    fs::clean_dir, EventStreamConfig, LiveManifestPublisher, MetadataInbox, ProcessSupervisor,
    PublisherConfig, TranscoderCommand,
};
use server::{build_router, render_viewer, AppState, VIEWER_PAGE};

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct ServerArgs {
    /// Directory the transcoder writes segments and manifests to
    #[clap(long, env = "DASHMETA_DASH_DIR", default_value = "live/app")]
    dash_dir: PathBuf,

    /// File name of the manifest written by the transcoder
    #[clap(long, default_value = "manifest.mpd")]
    manifest_name: String,

    /// File name of the manifest served to players
    #[clap(long, default_value = "live-manifest.mpd")]
    live_manifest_name: String,

    /// Address of the HTTP server
    #[clap(long, env = "DASHMETA_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Address the transcoder waits for the source feed on
    #[clap(
        long,
        env = "DASHMETA_INGEST_URL",
        default_value = "rtmp://localhost:1935/live/app"
    )]
    ingest_url: String,

    /// Path of the ffmpeg executable, looked up in PATH if not set
    #[clap(long)]
    ffmpeg: Option<PathBuf>,

    /// Interval between two live manifest updates, in milliseconds
    #[clap(long, default_value = "200")]
    poll_interval_ms: u64,

    /// Interval between two checks for the first manifest, in milliseconds
    #[clap(long, default_value = "100")]
    wait_interval_ms: u64,

    /// Duration of every metadata event, in timescale units
    #[clap(long, default_value = "1")]
    event_duration: u64,

    /// schemeIdUri of the injected EventStream
    #[clap(long, default_value = "urn:metadata")]
    scheme_id_uri: String,

    /// value of the injected EventStream
    #[clap(long, default_value = "metadata")]
    event_value: String,

    /// Timescale of the injected EventStream, presentation times are in these units
    #[clap(long, default_value = "1")]
    timescale: u64,

    /// Keep files left in the output directory by a previous run
    #[clap(long)]
    no_clean: bool,

    /// HTML file served at /watch instead of the built-in viewer.
    /// `{{live_manifest}}` and `{{scheme_id_uri}}` in it are filled in as
    /// JavaScript string literals.
    #[clap(long)]
    viewer: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .try_from_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = ServerArgs::parse();

    tokio::fs::create_dir_all(&args.dash_dir).await?;
    if !args.no_clean {
        clean_dir(&args.dash_dir).await?;
    }

    let base_manifest = args.dash_dir.join(&args.manifest_name);
    let mut command = TranscoderCommand::ffmpeg_dash(&args.ingest_url, &base_manifest);
    if let Some(ffmpeg) = args.ffmpeg.clone() {
        command = command.with_program(ffmpeg);
    }
    let supervisor = Arc::new(ProcessSupervisor::spawn(command));

    let inbox = Arc::new(MetadataInbox::new());
    let config = PublisherConfig::new(&args.dash_dir)
        .with_base_manifest(base_manifest)
        .with_live_manifest(args.dash_dir.join(&args.live_manifest_name))
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
        .with_wait_interval(Duration::from_millis(args.wait_interval_ms))
        .with_event_stream(
            EventStreamConfig::default()
                .with_scheme_id_uri(args.scheme_id_uri.clone())
                .with_value(args.event_value.clone())
                .with_timescale(args.timescale)
                .with_event_duration(args.event_duration),
        );
    let publisher = LiveManifestPublisher::new(config, inbox.clone(), supervisor.clone());
    tokio::spawn(async move {
        let log = publisher.run().await;
        tracing::info!("Published {} event(s) in total.", log.len());
    });

    let viewer = match &args.viewer {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => VIEWER_PAGE.to_string(),
    };
    let viewer = render_viewer(&viewer, &args.live_manifest_name, &args.scheme_id_uri);
    let state = AppState {
        inbox,
        liveness: supervisor,
        viewer: viewer.into(),
    };
    let router = build_router(state, &args.dash_dir);

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, stopping server.");
            }
        })
        .await?;

    Ok(())
}
