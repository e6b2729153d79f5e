//! Redis Mock Connection
//!
//! A programmable stand-in for a pipelined Redis connection. Tests declare
//! which commands will be issued and what each should reply, then run the
//! code under test against [`MockConn`] through the [`Conn`] trait.
//!
//! # Features
//!
//! - **Exact and Generic Matching**: Match by name and arguments, or by name only
//! - **Canned Replies**: Queue replies and errors per command, consumed in order
//! - **Pipelining**: `send` queues commands, `receive` replies in send order
//! - **Receive Gate**: Hold each `receive` until test code releases it
//! - **Fault Injection**: Override `close`, `err` and `flush` results
//! - **Fixtures**: Load registrations from YAML
//!
//! # Example
//!
//! ```no_run
//! use redis_mock_conn::{cmd, Conn, MockConn, Reply};
//!
//! # async fn example() {
//! let conn = MockConn::new();
//! conn.command("HGETALL", ["person:1"])
//!     .expect_map([("name", "Mr. Johson"), ("age", "42")]);
//!
//! let reply = conn.do_cmd(&cmd("HGETALL").arg("person:1")).await.unwrap();
//! assert_eq!(reply, Reply::strings(["name", "Mr. Johson", "age", "42"]));
//! # }
//! ```
//!
//! # Example Fixture
//!
//! ```yaml
//! commands:
//!   - name: HGETALL
//!     args: ["person:1"]
//!     responses:
//!       - type: map
//!         fields:
//!           name: Mr. Johson
//!           age: "42"
//!   - name: HGETALL
//!     generic: true
//!     responses:
//!       - type: error
//!         message: simulated error
//! ```

pub mod command;
pub mod config;
pub mod conn;
pub mod error;
pub mod gate;
pub mod matcher;
pub mod reply;
pub mod response;

pub use command::{cmd, Cmd, Signature, ToArg};
pub use config::MockConnConfig;
pub use conn::{CommandHandle, Conn, MockConn};
pub use error::MockError;
pub use gate::ReceiveSignal;
pub use reply::Reply;
