//! Async client for driving a GAMA simulation server over its websocket
//! command protocol.
//!
//! Commands are one-way: each call writes a single JSON frame and returns.
//! Acknowledgements, simulation output and errors arrive asynchronously and
//! are handed to the [`MessageHandler`] supplied at construction.
//!
//! Typical usage:
//! ```no_run
//! use gama_client::{ChannelHandler, Client, LoadOptions, Parameter};
//!
//! # async fn run() -> gama_client::ClientResult<()> {
//! let (handler, mut messages) = ChannelHandler::new();
//! let mut client = Client::new("localhost", 6868, handler);
//! client.connect(true).await?;
//!
//! let options = LoadOptions::default()
//!     .with_parameter(Parameter::new("int", "nb_preys_init", 100));
//! client
//!     .load("/models/predatorPrey.gaml", "prey_predatorExp", &options)
//!     .await?;
//!
//! while let Some(message) = messages.recv().await {
//!     println!("{:?}: {:?}", message.message_type(), message.content());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod command;
mod config;
mod error;
mod handler;
mod message;

pub use client::Client;
pub use command::{Command, CommandType, LoadOptions, Parameter, ReloadOptions};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use handler::{ChannelHandler, MessageHandler};
pub use message::{InboundMessage, MessageType, CONNECTION_SUCCESSFUL};
