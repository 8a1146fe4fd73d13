//! 使用脚本化 RESP 服务端的集成测试
//!
//! 服务端只实现测试用到的命令子集，并按需制造错误回复、延迟回复和不回复，
//! 不需要真实的 Redis 实例

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kvlab_adapter_redis::{
    CacheConfig, ReadOffset, RedisCacheManager, RedisConfig, RedisPool, RedisRepository,
    RedisStore, StreamReadOptions, Value,
};
use kvlab_errors::AppError;
use kvlab_ports::{Record, Repository};
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const WRONGTYPE: &str =
    "-WRONGTYPE Operation against a key holding the wrong kind of value\r\n";

enum Reply {
    Now(String),
    After(Duration, String),
    Never,
}

#[derive(Default)]
struct ServerState {
    /// 收到的全部命令（不含 MULTI/EXEC 本身）
    commands: Vec<Vec<String>>,
    /// 保存字符串值的键
    strings: HashSet<String>,
}

struct ScriptedRedis {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
}

impl ScriptedRedis {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(ServerState::default()));

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, shared.clone()));
            }
        });

        Self { addr, state }
    }

    async fn store(&self, operation_timeout: Duration) -> RedisStore {
        let config = RedisConfig::new(self.addr.ip().to_string(), self.addr.port())
            .with_pool_size(1)
            .with_operation_timeout(operation_timeout);
        RedisStore::new(Arc::new(RedisPool::new(config).await.unwrap()))
    }

    fn received(&self, name: &str) -> Vec<Vec<String>> {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|args| args[0].eq_ignore_ascii_case(name))
            .cloned()
            .collect()
    }
}

async fn serve(socket: TcpStream, state: Arc<Mutex<ServerState>>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut queued: Option<Vec<String>> = None;

    while let Ok(Some(args)) = read_command(&mut reader).await {
        let name = args[0].to_ascii_uppercase();
        let reply = match name.as_str() {
            "MULTI" => {
                queued = Some(Vec::new());
                Reply::Now("+OK\r\n".to_string())
            }
            "EXEC" => {
                let replies = queued.take().unwrap_or_default();
                Reply::Now(format!("*{}\r\n{}", replies.len(), replies.concat()))
            }
            _ => {
                let reply = respond(&args, &mut state.lock());
                match (&mut queued, reply) {
                    (Some(replies), Reply::Now(body)) => {
                        replies.push(body);
                        Reply::Now("+QUEUED\r\n".to_string())
                    }
                    (_, reply) => reply,
                }
            }
        };

        let body = match reply {
            Reply::Now(body) => body,
            Reply::After(delay, body) => {
                tokio::time::sleep(delay).await;
                body
            }
            Reply::Never => continue,
        };
        if write_half.write_all(body.as_bytes()).await.is_err() {
            break;
        }
    }
}

fn respond(args: &[String], state: &mut ServerState) -> Reply {
    state.commands.push(args.to_vec());
    let key = args.get(1).cloned().unwrap_or_default();

    match args[0].to_ascii_uppercase().as_str() {
        "PING" => Reply::Now("+PONG\r\n".to_string()),
        "SET" => {
            state.strings.insert(key);
            Reply::Now("+OK\r\n".to_string())
        }
        "RPUSH" if state.strings.contains(&key) => Reply::Now(WRONGTYPE.to_string()),
        "RPUSH" | "SADD" | "PEXPIRE" => Reply::Now(":1\r\n".to_string()),
        "DEL" => Reply::Now(":0\r\n".to_string()),
        "HSET" => Reply::Now(format!(":{}\r\n", (args.len() - 2) / 2)),
        "SUBSCRIBE" => Reply::Never,
        "XREADGROUP" => {
            let block = args
                .iter()
                .position(|a| a.eq_ignore_ascii_case("BLOCK"))
                .and_then(|i| args.get(i + 1))
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or_default();
            Reply::After(block, "*-1\r\n".to_string())
        }
        _ => Reply::Now("+OK\r\n".to_string()),
    }
}

/// 读取一条 RESP 数组形式的命令
async fn read_command<R>(reader: &mut R) -> std::io::Result<Option<Vec<String>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let count: usize = line
        .trim_end()
        .trim_start_matches('*')
        .parse()
        .map_err(|_| std::io::Error::other(format!("Unexpected line: {:?}", line)))?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await?;
        let len: usize = line
            .trim_end()
            .trim_start_matches('$')
            .parse()
            .map_err(|_| std::io::Error::other(format!("Unexpected line: {:?}", line)))?;

        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Ok(Some(args))
}

#[tokio::test]
async fn test_pipeline_reports_each_command_separately() {
    let server = ScriptedRedis::start().await;
    let store = server.store(Duration::from_secs(1)).await;

    let replies = store
        .run_pipelined(|p| {
            p.set("k", "Bernhard", None)
                .push_right("k", "x")
                .set("other", "Winner", None);
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(replies.len(), 3);
    assert!(matches!(replies[0], Ok(Value::Okay)));
    assert!(matches!(&replies[1], Err(AppError::Command(msg)) if msg.contains("WRONGTYPE")));
    assert!(matches!(replies[2], Ok(Value::Okay)));
    assert_eq!(server.received("SET").len(), 2);
}

#[tokio::test]
async fn test_zero_cache_ttl_stores_without_expiry() {
    let server = ScriptedRedis::start().await;
    let store = server.store(Duration::from_secs(1)).await;

    let manager =
        RedisCacheManager::new(store, CacheConfig::default().with_default_ttl(Duration::ZERO));
    let cache = manager.cache("products");
    assert_eq!(cache.ttl(), None);

    cache.put("P-001", "{}").await.unwrap();

    let sets = server.received("SET");
    assert_eq!(sets, vec![vec!["SET", "products::P-001", "{}"]]);
}

#[tokio::test]
async fn test_zero_repository_ttl_skips_expire() {
    let server = ScriptedRedis::start().await;
    let store = server.store(Duration::from_secs(1)).await;

    let repository: RedisRepository<Record> =
        RedisRepository::new(store, "products").with_default_ttl(Some(Duration::ZERO));
    let record = Record::new("1")
        .with_field("name", "Contoh Product")
        .with_ttl(Duration::ZERO);

    repository.save(&record).await.unwrap();

    assert_eq!(server.received("HSET").len(), 1);
    assert_eq!(server.received("SADD"), vec![vec!["SADD", "products", "1"]]);
    assert!(server.received("PEXPIRE").is_empty());
}

#[tokio::test]
async fn test_unconfirmed_subscribe_times_out() {
    let server = ScriptedRedis::start().await;
    let store = server.store(Duration::from_millis(200)).await;

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        store.subscribe("customers", |_| async { Ok(()) }),
    )
    .await
    .expect("subscribe must give up on its own");

    assert!(matches!(result, Err(AppError::BackendUnavailable(_))));
}

#[tokio::test]
async fn test_blocking_read_longer_than_operation_timeout() {
    let server = ScriptedRedis::start().await;
    let store = server.store(Duration::from_millis(100)).await;

    let options = StreamReadOptions::default().with_block(Duration::from_millis(300));
    let records = store
        .read_as_consumer_with("group", "consumer-1", "stream", ReadOffset::LastConsumed, &options)
        .await
        .unwrap();
    assert!(records.is_empty());

    // 连接在阻塞结束后才归还，仍然可用
    store.set("after-block", "ok", None).await.unwrap();
}

#[tokio::test]
async fn test_zero_block_rejected() {
    let server = ScriptedRedis::start().await;
    let store = server.store(Duration::from_millis(100)).await;

    let options = StreamReadOptions::default().with_block(Duration::ZERO);
    let err = store
        .read_as_consumer_with("group", "consumer-1", "stream", ReadOffset::LastConsumed, &options)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(server.received("XREADGROUP").is_empty());
}
