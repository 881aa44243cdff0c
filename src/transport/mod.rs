pub mod traits;
pub mod websocket;

pub use traits::{Pinger, Subscriber};
pub use websocket::{WebsocketConfig, WebsocketSubscriber};

use url::Url;

/// `api_home` with its path replaced by `path`
pub fn endpoint(api_home: &Url, path: &str) -> Url {
    let mut url = api_home.clone();
    url.set_path(path);
    url.set_query(None);
    url
}
