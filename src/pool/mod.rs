//! Static pool of worker connections and the router that pins tasks to them.

pub mod router;
pub mod worker;

pub use router::WorkerPoolRouter;
pub use worker::WorkerConnection;
