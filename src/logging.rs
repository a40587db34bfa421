use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a plain fmt subscriber at INFO level. Embedding applications that
/// bring their own subscriber should skip this; installing twice is a no-op.
pub fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
