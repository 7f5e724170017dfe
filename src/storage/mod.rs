use std::time::Instant;

use chrono::NaiveDateTime;
use color_eyre::{
    eyre::{eyre, Context},
    Result,
};
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    oneshot,
};

use crate::templates::models::Post;

pub use self::json::JsonStore;

mod json;

// Every task runs to completion on the executor thread before the next one
// is received, so read-modify-write cycles on the JSON files never interleave.
macro_rules! generate_executor {
    ($($task:ident / $fn:ident, ($store:ident $(, $arg:ident: $ty:ty)*) => $ret:ty $handler:block)*) => {
        #[derive(Clone)]
        pub struct ExecutorConnection(UnboundedSender<Task>);

        #[derive(Debug)]
        enum Task {
            $($task{tx:oneshot::Sender<Result<$ret>>,$($arg:$ty,)*}),*
        }

        impl ExecutorConnection {
            $(pub async fn $fn(&self, $($arg: $ty),*) -> Result<$ret> {
                let (tx, rx) = oneshot::channel();
                self.0
                    .send(Task::$task{tx,$($arg),*})
                    .map_err(|_| eyre!("Storage executor is not running"))?;
                rx.await.wrap_err("Storage executor dropped the task")?
            })*
        }

        pub struct StorageExecutor {
            rx: UnboundedReceiver<Task>,
            store: JsonStore,
        }

        impl StorageExecutor {
            pub fn create(store: JsonStore) -> (Self, ExecutorConnection) {
                let (tx, rx) = unbounded_channel();
                tracing::info!(
                    "Storage ready (posts: {}, image data: {})",
                    store.posts_path().display(),
                    store.image_data_path().display()
                );
                (Self { rx, store }, ExecutorConnection(tx))
            }

            pub fn run(self) {
                let Self { mut rx, store: json } = self;
                while let Some(task) = rx.blocking_recv() {
                    let before = Instant::now();
                    tracing::debug!("received task {:?}", task);
                    match task {
                        $(Task::$task{tx,$($arg),*} => {
                            let $store = &json;
                            let _e = tx.send((|| -> Result<$ret> { $handler })());
                        })*
                    }
                    tracing::debug!("task took {}ms", before.elapsed().as_secs_f64() * 1000.0);
                }
            }
        }
    };
}

generate_executor! {
    LoadPosts / load_posts, (store) => Vec<Post> {
        store.load_posts()
    }
    AppendPost / append_post, (store, title: String, content: String, time: NaiveDateTime) => Post {
        store.append_post(title, content, time)
    }
    SaveImageReference / save_image_reference, (store, filename: String) => () {
        store.save_image_reference(&filename)
    }
    LoadImageReference / load_image_reference, (store) => Option<String> {
        store.load_image_reference()
    }
}

#[cfg(test)]
pub fn spawn_test_executor(dir: &std::path::Path) -> ExecutorConnection {
    let store = JsonStore::new(dir.join("posts.json"), dir.join("image_data.json"));
    let (exec, conn) = StorageExecutor::create(store);
    std::thread::spawn(move || exec.run());
    conn
}
