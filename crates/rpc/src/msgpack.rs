//
//
use std::{
    io::{BufReader, BufWriter, Write},
    net::TcpStream,
    time::Duration,
};

use rmpv::Value;
use tracing::{debug, info, warn};

use crate::{ImageRequest, ImageResponse, ImageType, RpcError, SimulatorClient};

const REQUEST: u64 = 0;
const RESPONSE: u64 = 1;

/// Protocol version this client speaks.
pub const CLIENT_VERSION: i64 = 1;
/// Oldest server version this client accepts.
pub const MIN_REQUIRED_SERVER_VERSION: i64 = 1;

/// Blocking msgpack-RPC client over a single TCP connection.
pub struct MsgpackRpcClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    next_id: u32,
}

impl MsgpackRpcClient {
    /// Connect to `host:port`. `timeout` bounds every socket read and write.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, RpcError> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        debug!("connected to simulator rpc at {}:{}", host, port);
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            next_id: 0,
        })
    }

    /// Issue one call and block until the matching reply arrives.
    pub fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let msgid = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let request = Value::Array(vec![
            Value::from(REQUEST),
            Value::from(msgid),
            Value::from(method),
            Value::Array(params),
        ]);
        rmpv::encode::write_value(&mut self.writer, &request)
            .map_err(|e| RpcError::Encode(e.to_string()))?;
        self.writer.flush()?;

        loop {
            let reply = rmpv::decode::read_value(&mut self.reader)
                .map_err(|e| RpcError::Decode(e.to_string()))?;
            let (reply_id, result) = parse_reply(reply)?;
            if reply_id == u64::from(msgid) {
                return result;
            }
            warn!("dropping stale reply {} while waiting for {} ({})", reply_id, msgid, method);
        }
    }

    pub fn ping(&mut self) -> Result<bool, RpcError> {
        let reply = self.call("ping", Vec::new())?;
        Ok(reply.as_bool().unwrap_or(false))
    }

    pub fn server_version(&mut self) -> Result<i64, RpcError> {
        let reply = self.call("getServerVersion", Vec::new())?;
        reply
            .as_i64()
            .ok_or_else(|| RpcError::Protocol(format!("getServerVersion returned {}", reply)))
    }

    pub fn min_required_client_version(&mut self) -> Result<i64, RpcError> {
        let reply = self.call("getMinRequiredClientVersion", Vec::new())?;
        reply.as_i64().ok_or_else(|| {
            RpcError::Protocol(format!("getMinRequiredClientVersion returned {}", reply))
        })
    }
}

impl SimulatorClient for MsgpackRpcClient {
    fn confirm_connection(&mut self) -> Result<(), RpcError> {
        if self.ping()? {
            info!("Connected!");
        } else {
            warn!("Ping returned false!");
        }

        let server_ver = self.server_version()?;
        let client_min_ver = self.min_required_client_version()?;
        let ver_info = format!(
            "Client Ver:{} (Min Req: {}), Server Ver:{} (Min Req: {})",
            CLIENT_VERSION, client_min_ver, server_ver, MIN_REQUIRED_SERVER_VERSION
        );

        if server_ver < MIN_REQUIRED_SERVER_VERSION {
            warn!("{}", ver_info);
            warn!("Simulator server is of older version and not supported by this client. Please upgrade!");
        } else if CLIENT_VERSION < client_min_ver {
            warn!("{}", ver_info);
            warn!("Client is of older version and not supported by this server. Please upgrade!");
        } else {
            info!("{}", ver_info);
        }
        Ok(())
    }

    fn sim_get_image(
        &mut self,
        camera_name: &str,
        image_type: ImageType,
        vehicle_name: &str,
    ) -> Result<Vec<u8>, RpcError> {
        let reply = self.call(
            "simGetImage",
            vec![
                Value::from(camera_name),
                Value::from(image_type as i32),
                Value::from(vehicle_name),
            ],
        )?;
        let bytes = value_to_bytes(&reply)
            .ok_or_else(|| RpcError::Protocol(format!("simGetImage returned {}", type_name(&reply))))?;
        if bytes.is_empty() || bytes == [0] {
            return Err(RpcError::EmptyImage(camera_name.to_string()));
        }
        Ok(bytes)
    }

    fn sim_get_images(
        &mut self,
        requests: &[ImageRequest],
        vehicle_name: &str,
    ) -> Result<Vec<ImageResponse>, RpcError> {
        let encoded = requests.iter().map(encode_request).collect();
        let reply = self.call(
            "simGetImages",
            vec![Value::Array(encoded), Value::from(vehicle_name)],
        )?;
        match reply {
            Value::Array(items) => items.iter().map(decode_response).collect(),
            other => Err(RpcError::Protocol(format!(
                "simGetImages returned {}",
                type_name(&other)
            ))),
        }
    }
}

/// Split a `[1, msgid, error, result]` frame into its id and outcome.
fn parse_reply(reply: Value) -> Result<(u64, Result<Value, RpcError>), RpcError> {
    let mut parts = match reply {
        Value::Array(parts) if parts.len() == 4 => parts,
        other => {
            return Err(RpcError::Protocol(format!(
                "expected 4-element response, got {}",
                other
            )))
        }
    };
    if parts[0].as_u64() != Some(RESPONSE) {
        return Err(RpcError::Protocol(format!("unexpected message type {}", parts[0])));
    }
    let msgid = parts[1]
        .as_u64()
        .ok_or_else(|| RpcError::Protocol(format!("bad message id {}", parts[1])))?;
    let result = parts.pop().unwrap_or(Value::Nil);
    let error = parts.pop().unwrap_or(Value::Nil);

    if error.is_nil() {
        Ok((msgid, Ok(result)))
    } else {
        let message = match error.as_str() {
            Some(s) => s.to_string(),
            None => error.to_string(),
        };
        Ok((msgid, Err(RpcError::Remote(message))))
    }
}

pub(crate) fn encode_request(req: &ImageRequest) -> Value {
    Value::Map(vec![
        (Value::from("camera_name"), Value::from(req.camera_name.as_str())),
        (Value::from("image_type"), Value::from(req.image_type as i32)),
        (Value::from("pixels_as_float"), Value::from(req.pixels_as_float)),
        (Value::from("compress"), Value::from(req.compress)),
    ])
}

pub(crate) fn decode_response(value: &Value) -> Result<ImageResponse, RpcError> {
    let map = value
        .as_map()
        .ok_or_else(|| RpcError::Protocol(format!("image response is {}", type_name(value))))?;

    let mut resp = ImageResponse::default();
    for (key, field) in map {
        let Some(key) = key.as_str() else { continue };
        match key {
            "image_data_uint8" => {
                resp.image_data_uint8 = value_to_bytes(field).ok_or_else(|| {
                    RpcError::Protocol("image_data_uint8 is not a byte buffer".to_string())
                })?;
            }
            "image_data_float" => {
                resp.image_data_float = field
                    .as_array()
                    .map(|xs| xs.iter().filter_map(|x| x.as_f64()).map(|x| x as f32).collect())
                    .unwrap_or_default();
            }
            "camera_name" => resp.camera_name = field.as_str().unwrap_or_default().to_string(),
            "image_type" => {
                resp.image_type = field
                    .as_i64()
                    .and_then(ImageType::from_i64)
                    .unwrap_or_default();
            }
            "width" => resp.width = as_u32(field, "width")?,
            "height" => resp.height = as_u32(field, "height")?,
            "time_stamp" => resp.time_stamp = field.as_u64().unwrap_or(0),
            "message" => resp.message = field.as_str().unwrap_or_default().to_string(),
            "pixels_as_float" => resp.pixels_as_float = field.as_bool().unwrap_or(false),
            "compress" => resp.compress = field.as_bool().unwrap_or(false),
            _ => {}
        }
    }
    Ok(resp)
}

fn as_u32(value: &Value, field: &str) -> Result<u32, RpcError> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| RpcError::Protocol(format!("{} is not a dimension: {}", field, value)))
}

/// Byte buffers arrive as bin, as legacy raw strings, or as arrays of small ints.
fn value_to_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Binary(bytes) => Some(bytes.clone()),
        Value::String(s) => Some(s.as_bytes().to_vec()),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "bool",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "ext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Serve `count` calls on one connection, answering with `handler`.
    fn spawn_server<F>(count: usize, handler: F) -> (u16, thread::JoinHandle<Vec<(String, Vec<Value>)>>)
    where
        F: Fn(&str, &[Value]) -> (Value, Value) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut seen = Vec::new();
            for _ in 0..count {
                let req = rmpv::decode::read_value(&mut reader).unwrap();
                let parts = req.as_array().unwrap().clone();
                let msgid = parts[1].clone();
                let method = parts[2].as_str().unwrap().to_string();
                let params = parts[3].as_array().unwrap().clone();
                let (error, result) = handler(&method, &params);
                let reply = Value::Array(vec![Value::from(1), msgid, error, result]);
                rmpv::encode::write_value(&mut writer, &reply).unwrap();
                seen.push((method, params));
            }
            seen
        });
        (port, handle)
    }

    fn client(port: u16) -> MsgpackRpcClient {
        MsgpackRpcClient::connect("127.0.0.1", port, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn confirm_connection_runs_handshake() {
        let (port, server) = spawn_server(3, |method, _| match method {
            "ping" => (Value::Nil, Value::from(true)),
            "getServerVersion" => (Value::Nil, Value::from(1)),
            "getMinRequiredClientVersion" => (Value::Nil, Value::from(1)),
            _ => (Value::from("unknown method"), Value::Nil),
        });
        let mut c = client(port);
        c.confirm_connection().unwrap();

        let methods: Vec<String> = server.join().unwrap().into_iter().map(|(m, _)| m).collect();
        assert_eq!(methods, vec!["ping", "getServerVersion", "getMinRequiredClientVersion"]);
    }

    #[test]
    fn sim_get_image_returns_buffer() {
        let (port, server) = spawn_server(1, |_, _| (Value::Nil, Value::Binary(vec![7u8; 16])));
        let mut c = client(port);
        let bytes = c.sim_get_image("fpv_cam", ImageType::Scene, "").unwrap();
        assert_eq!(bytes, vec![7u8; 16]);

        let calls = server.join().unwrap();
        assert_eq!(calls[0].0, "simGetImage");
        assert_eq!(calls[0].1[0].as_str(), Some("fpv_cam"));
        assert_eq!(calls[0].1[1].as_i64(), Some(0));
    }

    #[test]
    fn sim_get_image_empty_is_error() {
        let (port, _server) = spawn_server(1, |_, _| (Value::Nil, Value::Binary(vec![0u8])));
        let mut c = client(port);
        let err = c.sim_get_image("fpv_cam", ImageType::Scene, "").unwrap_err();
        assert!(matches!(err, RpcError::EmptyImage(ref cam) if cam == "fpv_cam"));
    }

    #[test]
    fn sim_get_images_decodes_responses() {
        let (port, server) = spawn_server(1, |_, _| {
            let resp = Value::Map(vec![
                (Value::from("image_data_uint8"), Value::Binary(vec![1u8; 2 * 3 * 4])),
                (Value::from("image_data_float"), Value::Array(vec![])),
                (Value::from("camera_name"), Value::from("fpv_cam")),
                (Value::from("width"), Value::from(3)),
                (Value::from("height"), Value::from(2)),
                (Value::from("image_type"), Value::from(0)),
                (Value::from("time_stamp"), Value::from(1234u64)),
                (Value::from("message"), Value::from("")),
                (Value::from("compress"), Value::from(false)),
                (Value::from("pixels_as_float"), Value::from(false)),
            ]);
            (Value::Nil, Value::Array(vec![resp]))
        });
        let mut c = client(port);
        let req = [ImageRequest::uncompressed("fpv_cam", ImageType::Scene)];
        let responses = c.sim_get_images(&req, "").unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].width, 3);
        assert_eq!(responses[0].height, 2);
        assert_eq!(responses[0].image_data_uint8.len(), 24);
        assert_eq!(responses[0].time_stamp, 1234);

        let calls = server.join().unwrap();
        let sent = calls[0].1[0].as_array().unwrap()[0].clone();
        let sent = sent.as_map().unwrap();
        assert!(sent.iter().any(|(k, v)| k.as_str() == Some("compress") && v.as_bool() == Some(false)));
        assert!(sent.iter().any(|(k, v)| k.as_str() == Some("camera_name") && v.as_str() == Some("fpv_cam")));
    }

    #[test]
    fn remote_error_is_surfaced() {
        let (port, _server) = spawn_server(1, |_, _| {
            (Value::from("rpclib: function 'simGetImages' threw an exception"), Value::Nil)
        });
        let mut c = client(port);
        let req = [ImageRequest::uncompressed("missing_cam", ImageType::Scene)];
        let err = c.sim_get_images(&req, "").unwrap_err();
        match err {
            RpcError::Remote(msg) => assert!(msg.contains("threw an exception")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bytes_from_int_array() {
        let v = Value::Array(vec![Value::from(1), Value::from(255)]);
        assert_eq!(value_to_bytes(&v), Some(vec![1, 255]));
        let bad = Value::Array(vec![Value::from(256)]);
        assert_eq!(value_to_bytes(&bad), None);
    }

    #[test]
    fn malformed_reply_is_protocol_error() {
        let err = parse_reply(Value::Array(vec![Value::from(1)])).unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }
}
