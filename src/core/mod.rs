pub mod cdn;
pub mod cors;
pub mod dispatcher;
pub mod exception;
pub mod host;
pub mod method;
pub mod node;
pub mod path;
pub mod request;
pub mod root;
pub mod segment;

pub use cdn::{CdnCheck, CdnDecision, CdnRule};
pub use dispatcher::Dispatcher;
pub use exception::{Exception, Failure, HttpException, raise};
pub use host::{ConnectionAddrs, HostContext};
pub use node::{Handler, Redirect, ReplyContext, ReplyResult, Resource, ResourceNode, Walk};
pub use path::PathContext;
pub use request::{Evaluation, RequestHead};
pub use root::DispatchRoot;
pub use segment::SegmentMatcher;
