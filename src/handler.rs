use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use futures::{future, stream};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use multer::Multipart;
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, DynamicConfig, QueryParams, SERVICE_NAME, SERVICE_VERSION};
use crate::i18n::{detect_language, I18n};
use crate::link::generate_vless_url;
use crate::qr;
use crate::render::{ConfigPage, HomePage, Renderer};
use crate::template::TemplateStore;

/// 响应类型
pub type HttpResponse = Response<Full<Bytes>>;

/// 二维码表单请求体上限
const MAX_FORM_BYTES: usize = 1 << 20;

const VLESS_SCHEME: &str = "vless://";

/// 请求处理共享的只读状态
pub struct AppState {
    pub templates: TemplateStore,
    pub renderer: Renderer,
    pub i18n: I18n,
}

impl AppState {
    pub fn new(templates: TemplateStore, renderer: Renderer, i18n: I18n) -> Self {
        Self {
            templates,
            renderer,
            i18n,
        }
    }

    /// 启动时加载全部只读资源，任何失败都视为致命错误
    pub fn load(config: &AppConfig) -> anyhow::Result<Self> {
        let i18n = I18n::load_builtin()?;
        let renderer = Renderer::load_builtin()?;
        let templates = TemplateStore::load(&config.templates)?;
        Ok(Self::new(templates, renderer, i18n))
    }
}

/// 路由结果
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Home,
    Health,
    QrCode,
    ConfigPage { config_type: String, uuid: String },
    ConfigDownload { config_type: String, uuid: String },
    NotFound,
}

impl Route {
    fn resolve(path: &str) -> Self {
        let path = percent_decode_str(path).decode_utf8_lossy();
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Route::Home;
        }

        let parts: Vec<&str> = trimmed.split('/').collect();
        match parts.as_slice() {
            ["health"] => Route::Health,
            ["qrcode"] => Route::QrCode,
            ["config", config_type, file] if !config_type.is_empty() => {
                match file.strip_suffix(".json") {
                    Some(uuid) if !uuid.is_empty() => Route::ConfigDownload {
                        config_type: config_type.to_string(),
                        uuid: uuid.to_string(),
                    },
                    _ => Route::NotFound,
                }
            }
            [config_type, uuid] if !config_type.is_empty() && !uuid.is_empty() => {
                Route::ConfigPage {
                    config_type: config_type.to_string(),
                    uuid: uuid.to_string(),
                }
            }
            _ => Route::NotFound,
        }
    }
}

/// 处理单个 HTTP 请求并记录访问日志
pub async fn handle_request<B>(
    state: Arc<AppState>,
    req: Request<B>,
    remote_addr: SocketAddr,
) -> Result<HttpResponse, Infallible>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let client_ip = client_ip(req.headers(), remote_addr);
    let user_agent = header_str(req.headers(), header::USER_AGENT).to_string();
    let referer = header_str(req.headers(), header::REFERER).to_string();

    let response = dispatch(&state, req, &client_ip).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    let bytes = response.body().size_hint().exact().unwrap_or(0);

    macro_rules! access_log {
        ($level:ident, $msg:literal) => {
            $level!(
                method = %method,
                path = %path,
                query = %query,
                status,
                duration_ms,
                bytes,
                remote_addr = %client_ip,
                user_agent = %user_agent,
                referer = %referer,
                $msg
            )
        };
    }

    match status {
        500..=u16::MAX => access_log!(error, "HTTP 请求完成 (服务端错误)"),
        400..=499 => access_log!(warn, "HTTP 请求完成 (客户端错误)"),
        _ => access_log!(info, "HTTP 请求完成"),
    }

    Ok(response)
}

async fn dispatch<B>(state: &AppState, req: Request<B>, client_ip: &str) -> HttpResponse
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let route = Route::resolve(req.uri().path());

    if route == Route::QrCode {
        return qr_code(req).await;
    }

    let query = QueryParams::parse(req.uri().query().unwrap_or(""));
    match route {
        Route::Home => home_page(state, &query, client_ip),
        Route::Health => health(state),
        Route::ConfigPage { config_type, uuid } => {
            config_page(state, &config_type, &uuid, &query, req.uri().query(), client_ip)
        }
        Route::ConfigDownload { config_type, uuid } => {
            config_download(state, &config_type, &uuid, &query, client_ip)
        }
        Route::QrCode | Route::NotFound => {
            warn!("无效的请求路径: {} (来自 {})", req.uri().path(), client_ip);
            not_found()
        }
    }
}

/// 首页：带默认值的配置表单
fn home_page(state: &AppState, query: &QueryParams, client_ip: &str) -> HttpResponse {
    let language = detect_language(query.get("lang"));
    info!("🏠 首页请求 (语言: {}, 来自 {})", language, client_ip);

    let defaults = DynamicConfig::default();
    let page = HomePage {
        language,
        texts: state.i18n.texts(language),
        defaults: &defaults,
    };

    match state.renderer.render_home(&page) {
        Ok(body) => html(body),
        Err(e) => {
            error!("首页渲染失败: {}", e);
            internal_error("Internal server error")
        }
    }
}

/// 配置页：二维码 + 连接 URL
fn config_page(
    state: &AppState,
    config_type: &str,
    uuid: &str,
    query: &QueryParams,
    raw_query: Option<&str>,
    client_ip: &str,
) -> HttpResponse {
    let language = detect_language(query.get("lang"));
    let dynamic = DynamicConfig::from_query(query);

    info!(
        "📝 生成配置页: type={} uuid={} server={}:{} path={} (语言: {}, 来自 {})",
        config_type, uuid, dynamic.server, dynamic.server_port, dynamic.ws_path, language, client_ip
    );

    let config = match state.templates.generate_config(config_type, uuid, &dynamic) {
        Ok(config) => config,
        Err(e) if e.is_not_found() => {
            warn!("配置类型无效: {} ({})", config_type, e);
            return not_found();
        }
        Err(e) => {
            error!("配置生成失败: {}", e);
            return internal_error("Internal server error");
        }
    };

    let vless_url = match generate_vless_url(&config, uuid) {
        Ok(url) => url,
        Err(e) => {
            error!("VLESS URL 生成失败: type={} uuid={}: {}", config_type, uuid, e);
            return internal_error("Failed to generate configuration URL");
        }
    };

    let png = match qr::encode_png(&vless_url) {
        Ok(png) => png,
        Err(e) => {
            error!("二维码生成失败: type={} uuid={}: {}", config_type, uuid, e);
            return internal_error("Failed to generate QR code");
        }
    };

    let page = ConfigPage {
        language,
        texts: state.i18n.texts(language),
        config_type,
        uuid,
        qr_code: general_purpose::STANDARD.encode(png),
        vless_url: &vless_url,
        query_string: raw_query.unwrap_or(""),
    };

    match state.renderer.render_config(&page) {
        Ok(body) => html(body),
        Err(e) => {
            error!("配置页渲染失败: {}", e);
            internal_error("Internal server error")
        }
    }
}

/// 配置文件下载
fn config_download(
    state: &AppState,
    config_type: &str,
    uuid: &str,
    query: &QueryParams,
    client_ip: &str,
) -> HttpResponse {
    let dynamic = DynamicConfig::from_query(query);

    info!(
        "📥 生成配置文件下载: type={} uuid={} server={}:{} (来自 {})",
        config_type, uuid, dynamic.server, dynamic.server_port, client_ip
    );

    let config = match state.templates.generate_config(config_type, uuid, &dynamic) {
        Ok(config) => config,
        Err(e) if e.is_not_found() => {
            warn!("配置类型无效: {} ({})", config_type, e);
            return not_found();
        }
        Err(e) => {
            error!("配置生成失败: {}", e);
            return internal_error("Internal server error");
        }
    };

    let mut body = match serde_json::to_vec(&config) {
        Ok(body) => body,
        Err(e) => {
            error!("配置 JSON 编码失败: type={} uuid={}: {}", config_type, uuid, e);
            return internal_error("Failed to encode configuration");
        }
    };
    body.push(b'\n');

    let mut response = bytes_response(StatusCode::OK, "application/json", body);
    let disposition = format!("attachment; filename={}-config.json", config_type);
    match HeaderValue::from_str(&disposition) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(header::CONTENT_DISPOSITION, value);
        }
        Err(e) => warn!("Content-Disposition 无效: {}", e),
    }
    response
}

/// 健康检查
fn health(state: &AppState) -> HttpResponse {
    let body = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "templates": state.templates.template_types(),
    });

    debug!("健康检查完成");
    json_response(StatusCode::OK, &body)
}

/// 根据表单中的 VLESS URL 生成二维码 PNG
async fn qr_code<B>(req: Request<B>) -> HttpResponse
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if req.method() != Method::POST {
        return method_not_allowed("POST");
    }

    let query = QueryParams::parse(req.uri().query().unwrap_or(""));
    let content_type = header_str(req.headers(), header::CONTENT_TYPE).to_string();
    let body = match Limited::new(req.into_body(), MAX_FORM_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("二维码表单读取失败: {}", e);
            return text_response(StatusCode::BAD_REQUEST, "Invalid form data");
        }
    };

    let form_url = if is_multipart(&content_type) {
        match multipart_field(body, &content_type, "url").await {
            Ok(value) => value,
            Err(e) => {
                error!("multipart 表单解析失败: {}", e);
                return text_response(StatusCode::BAD_REQUEST, "Invalid form data");
            }
        }
    } else {
        QueryParams::parse_bytes(&body).get("url").map(str::to_string)
    };

    // 表单字段优先，其次是查询参数
    let Some(vless_url) = form_url.or_else(|| query.get("url").map(str::to_string)) else {
        warn!("二维码请求缺少 url 参数");
        return text_response(StatusCode::BAD_REQUEST, "URL parameter is required");
    };

    if !vless_url.starts_with(VLESS_SCHEME) {
        warn!("无效的 VLESS URL: {}", vless_url);
        return text_response(StatusCode::BAD_REQUEST, "Invalid VLESS URL");
    }

    match qr::encode_png(&vless_url) {
        Ok(png) => {
            debug!("二维码生成成功 (URL 长度: {})", vless_url.len());
            let mut response = bytes_response(StatusCode::OK, "image/png", png);
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            );
            response
        }
        Err(e) => {
            error!("二维码生成失败: {}", e);
            internal_error("Failed to generate QR code")
        }
    }
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
}

/// 从已读取的 multipart 请求体中取出第一个非空的同名字段
async fn multipart_field(
    body: Bytes,
    content_type: &str,
    name: &str,
) -> Result<Option<String>, multer::Error> {
    let boundary = multer::parse_boundary(content_type)?;
    let body = stream::once(future::ready(Ok::<Bytes, Infallible>(body)));
    let mut multipart = Multipart::new(body, boundary);

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(name) {
            continue;
        }
        let value = field.text().await?;
        if !value.is_empty() {
            return Ok(Some(value));
        }
    }

    Ok(None)
}

fn client_ip(headers: &HeaderMap, remote_addr: SocketAddr) -> String {
    let forwarded = header_str(headers, "x-forwarded-for");
    if !forwarded.is_empty() {
        return forwarded.to_string();
    }
    let real_ip = header_str(headers, "x-real-ip");
    if !real_ip.is_empty() {
        return real_ip.to_string();
    }
    remote_addr.to_string()
}

fn header_str<K: header::AsHeaderName>(headers: &HeaderMap, key: K) -> &str {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn bytes_response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn html(body: String) -> HttpResponse {
    bytes_response(StatusCode::OK, "text/html; charset=utf-8", body)
}

fn json_response(status: StatusCode, value: &Value) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(mut body) => {
            body.push(b'\n');
            bytes_response(status, "application/json", body)
        }
        Err(e) => {
            error!("JSON 编码失败: {}", e);
            internal_error("Internal server error")
        }
    }
}

fn text_response(status: StatusCode, message: &str) -> HttpResponse {
    let mut response = bytes_response(status, "text/plain; charset=utf-8", format!("{}\n", message));
    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

fn not_found() -> HttpResponse {
    text_response(StatusCode::NOT_FOUND, "404 page not found")
}

fn internal_error(message: &str) -> HttpResponse {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

fn method_not_allowed(allow: &'static str) -> HttpResponse {
    let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::load(&AppConfig::default()).unwrap())
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn send(req: Request<Full<Bytes>>) -> HttpResponse {
        handle_request(state(), req, peer()).await.unwrap()
    }

    async fn get(uri: &str) -> HttpResponse {
        send(Request::get(uri).body(Full::default()).unwrap()).await
    }

    async fn body_bytes(response: HttpResponse) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn post_form(body: &'static str) -> Request<Full<Bytes>> {
        Request::post("/qrcode")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[test]
    fn test_route_resolve() {
        assert_eq!(Route::resolve("/"), Route::Home);
        assert_eq!(Route::resolve(""), Route::Home);
        assert_eq!(Route::resolve("/health"), Route::Health);
        assert_eq!(Route::resolve("/qrcode"), Route::QrCode);
        assert_eq!(
            Route::resolve("/vless/abc"),
            Route::ConfigPage {
                config_type: "vless".into(),
                uuid: "abc".into()
            }
        );
        assert_eq!(
            Route::resolve("/vless/abc/"),
            Route::ConfigPage {
                config_type: "vless".into(),
                uuid: "abc".into()
            }
        );
        assert_eq!(
            Route::resolve("/config/vless/abc.json"),
            Route::ConfigDownload {
                config_type: "vless".into(),
                uuid: "abc".into()
            }
        );
        assert_eq!(
            Route::resolve("/vless/a%20b"),
            Route::ConfigPage {
                config_type: "vless".into(),
                uuid: "a b".into()
            }
        );
    }

    #[test]
    fn test_route_not_found() {
        assert_eq!(Route::resolve("/vless/"), Route::NotFound);
        assert_eq!(Route::resolve("/vless"), Route::NotFound);
        assert_eq!(Route::resolve("/vless//abc"), Route::NotFound);
        assert_eq!(Route::resolve("/a/b/c"), Route::NotFound);
        assert_eq!(Route::resolve("/config/vless/abc"), Route::NotFound);
        assert_eq!(Route::resolve("/config/vless/.json"), Route::NotFound);
        assert_eq!(Route::resolve("/config//abc.json"), Route::NotFound);
    }

    #[test]
    fn test_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer()), "127.0.0.1:40000");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers, peer()), "10.0.0.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        assert_eq!(client_ip(&headers, peer()), "10.0.0.1");
    }

    #[tokio::test]
    async fn test_home_page() {
        let response = get("/?lang=ru").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        let body = body_bytes(response).await;
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains("lang=\"ru\""));
    }

    #[tokio::test]
    async fn test_config_page() {
        let response = get("/vless/abc?server=ex.com&port=443&ws-path=/ws").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_bytes(response).await;
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains(
            "vless://abc@ex.com:443?type=ws&amp;path=/ws&amp;host=ex.com&amp;security=tls&amp;fp=chrome"
        ));
        assert!(html.contains("data:image/png;base64,iVBORw0KGgo"));
        assert!(html.contains("/config/vless/abc.json?server=ex.com&amp;port=443&amp;ws-path=/ws"));
    }

    #[tokio::test]
    async fn test_not_found_paths() {
        for uri in ["/nosuch/uuid", "/vless/", "/config/nosuch/abc.json", "/a/b/c"] {
            let response = get(uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(body_bytes(response).await, "404 page not found\n");
        }
    }

    #[tokio::test]
    async fn test_config_download() {
        let response = get("/config/vless/abc.json?server=ex.com&tun-mtu=1500").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=vless-config.json"
        );

        let body = body_bytes(response).await;
        assert!(body.ends_with(b"\n"));
        let config: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(config["outbounds"][0]["uuid"], "abc");
        assert_eq!(config["outbounds"][0]["server"], "ex.com");
        assert_eq!(config["outbounds"][0]["server_port"], 443);
        assert_eq!(config["inbounds"][0]["mtu"], 1500);
    }

    #[tokio::test]
    async fn test_health() {
        let response = get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "vless-generator");
        assert_eq!(body["version"], SERVICE_VERSION);
        assert_eq!(body["templates"], json!(["vless"]));

        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_qr_code() {
        let response = send(post_form("url=vless%3A%2F%2Fabc%40ex.com%3A443%3Ftype%3Dws")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        let body = body_bytes(response).await;
        assert!(body.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn test_qr_code_rejects_bad_input() {
        let response = send(post_form("url=http://evil")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_bytes(response).await, "Invalid VLESS URL\n");

        let response = send(post_form("other=1")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_bytes(response).await, "URL parameter is required\n");
    }

    fn post_multipart(content_type: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::post("/qrcode")
            .header(header::CONTENT_TYPE, content_type)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_qr_code_multipart() {
        let body = "--XYZ\r\n\
                    Content-Disposition: form-data; name=\"note\"\r\n\r\n\
                    ignored\r\n\
                    --XYZ\r\n\
                    Content-Disposition: form-data; name=\"url\"\r\n\r\n\
                    vless://abc@ex.com:443?type=ws\r\n\
                    --XYZ--\r\n";
        let response = send(post_multipart("multipart/form-data; boundary=XYZ", body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert!(body_bytes(response).await.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn test_qr_code_multipart_errors() {
        let body = "--XYZ\r\n\
                    Content-Disposition: form-data; name=\"url\"\r\n\r\n\
                    http://evil\r\n\
                    --XYZ--\r\n";
        let response = send(post_multipart("multipart/form-data; boundary=XYZ", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_bytes(response).await, "Invalid VLESS URL\n");

        let response = send(post_multipart("multipart/form-data", "url=vless://abc")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_bytes(response).await, "Invalid form data\n");
    }

    #[tokio::test]
    async fn test_qr_code_query_fallback() {
        let req = Request::post("/qrcode?url=vless://abc@ex.com:443")
            .body(Full::default())
            .unwrap();
        let response = send(req).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_qr_code_requires_post() {
        let response = get("/qrcode").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
    }

    #[tokio::test]
    async fn test_pages_accept_any_method() {
        let response = send(Request::post("/").body(Full::default()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(Request::delete("/health").body(Full::default()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let req = Request::put("/config/vless/abc.json").body(Full::default()).unwrap();
        assert_eq!(send(req).await.status(), StatusCode::OK);
    }
}
