mod batch;
mod entry;
mod feed;
mod subscription;

pub use batch::Batch;
pub use entry::{Entry, EntryState, EntryUpdate, IncomingEntry, NewEntry, Original, ThreadReply};
pub use feed::{Feed, FeedUpdate, NewFeed};
pub use subscription::{NewUpdatedEntry, Subscription};
