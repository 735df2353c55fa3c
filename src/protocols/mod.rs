//! Protocol handlers.
//!
//! Each protocol implements [`BufferedSocketHandler`] and is instantiated
//! once per connection by [`new_handler`].
//!
//! - `echo`: raw byte echo, supports direct mode
//! - `ping`: line-based ping/pong

pub mod echo;
pub mod output;
pub mod ping;

use crate::config::ProtocolType;
use crate::runtime::{BufferedSocketHandler, RawSocket};

/// Create the handler for a new connection.
pub fn new_handler<S: RawSocket>(protocol: ProtocolType) -> Box<dyn BufferedSocketHandler<S>> {
    match protocol {
        ProtocolType::Echo => Box::new(echo::EchoHandler::new()),
        ProtocolType::Ping => Box::new(ping::PingHandler::new()),
    }
}
