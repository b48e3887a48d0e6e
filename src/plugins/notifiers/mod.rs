// Notifier plugin implementations
pub mod wxpusher;

pub use wxpusher::WxPusherNotifier;
