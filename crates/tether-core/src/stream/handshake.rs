use std::sync::Arc;

use crate::future::BoxFuture;
use crate::status::{Status, StatusCode};
use crate::stream::{SharedStream, StreamInitializer};

type RequestBuilder<Req> = Arc<dyn Fn() -> Req + Send + Sync>;
type ResponseValidator<Resp> = Arc<dyn Fn(&Resp) -> Result<(), Status> + Send + Sync>;
type InitFuture<Req, Resp> = BoxFuture<'static, Result<SharedStream<Req, Resp>, Status>>;

/// 首包握手初始化器的构造器。
///
/// # 教案式说明
/// - **意图 (Why)**：许多流式 API 要求连接建立后先发一条“打开会话”的请求，再等待服务端
///   回执确认；把这一段写成通用初始化器，状态机就无需关心具体协议；
/// - **逻辑 (How)**：
///   1. 若配置了请求构造器，写入首条请求；
///   2. 读取首条响应并交给校验函数；
///   3. 任一步失败则 `cancel` + `finish` 该流；校验拒绝时报告校验函数给出的状态，
///      读写失败时优先报告 `finish` 返回的状态；
/// - **契约 (What)**：首条响应被握手消费，不会再交给调用方的 `read`。
pub struct Handshake<Req, Resp> {
    request: Option<RequestBuilder<Req>>,
    validate: ResponseValidator<Resp>,
}

impl<Req, Resp> Handshake<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// 仅校验首条响应的握手。
    pub fn new<V>(validate: V) -> Self
    where
        V: Fn(&Resp) -> Result<(), Status> + Send + Sync + 'static,
    {
        Self {
            request: None,
            validate: Arc::new(validate),
        }
    }

    /// 在读取首条响应前先写入一条请求。
    pub fn with_request<F>(mut self, build: F) -> Self
    where
        F: Fn() -> Req + Send + Sync + 'static,
    {
        self.request = Some(Arc::new(build));
        self
    }

    pub fn into_initializer(self) -> StreamInitializer<Req, Resp> {
        let Handshake { request, validate } = self;
        Arc::new(move |stream: SharedStream<Req, Resp>| -> InitFuture<Req, Resp> {
            let request = request.clone();
            let validate = Arc::clone(&validate);
            Box::pin(async move {
                if let Some(build) = request {
                    if !stream.write(build()).await {
                        let finished = close(&stream).await;
                        return Err(more_specific(finished, "handshake write failed"));
                    }
                }
                match stream.read().await {
                    Some(response) => match validate(&response) {
                        Ok(()) => Ok(stream),
                        Err(rejected) => {
                            close(&stream).await;
                            Err(rejected)
                        }
                    },
                    None => {
                        let finished = close(&stream).await;
                        Err(more_specific(finished, "stream closed during handshake"))
                    }
                }
            })
        })
    }
}

/// 不做任何初始化，直接采用已启动的流。
pub fn passthrough_initializer<Req, Resp>() -> StreamInitializer<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    Arc::new(|stream: SharedStream<Req, Resp>| -> InitFuture<Req, Resp> {
        Box::pin(async move { Ok(stream) })
    })
}

async fn close<Req, Resp>(stream: &SharedStream<Req, Resp>) -> Status
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    stream.cancel();
    stream.finish().await
}

/// `finish` 给出非 `Ok`、非 `Cancelled` 的状态时优先采用，否则退回到描述性的 `Unavailable`。
fn more_specific(finished: Status, fallback: &'static str) -> Status {
    match finished.code() {
        StatusCode::Ok | StatusCode::Cancelled => Status::unavailable(fallback),
        _ => finished,
    }
}
