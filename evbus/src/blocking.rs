//! 阻塞地驱动 future 直至完成
//!
//! 阻塞式 API（`publish`、`subscribe` 等）需要在同步上下文中等待注册表锁，
//! 或以阻塞方式执行异步处理器。这些调用可能彼此嵌套（处理器内部再同步发布到
//! 另一条总线），而 `futures_executor::block_on` 不允许嵌套，因此嵌套时改为
//! 在当前线程上 park/unpark 轮询。
//!
use futures_util::task::{ArcWake, waker};
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, Thread};

struct ThreadWaker(Thread);

impl ArcWake for ThreadWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.unpark();
    }
}

pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    match futures_executor::enter() {
        Ok(guard) => {
            drop(guard);
            futures_executor::block_on(future)
        }
        Err(_) => park_on(future),
    }
}

fn park_on<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    let waker = waker(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        thread::park();
    }
}
