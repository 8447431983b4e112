//! `wasm-bindgen` entry point: platform implementations over the live page
//! and the event wiring. Only compiled on `wasm32` targets.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use gloo_timers::callback::Interval;
use js_sys::{Array, Function, JSON, Object, Promise, Reflect};
use serde_json::Value;
use skopeo_agent::network::is_textual_content_type;
use skopeo_agent::{
    Agent, ClickOutcome, Clock, ConsoleBackend, Document, HttpRequest, HttpResponse,
    InterceptingConsole, InterceptingTransport, JsonSink, LookupError, RequestBody, RequestIds,
    ResourceEntry, ResourceObserver, StorageError, StorageSource, Transport, TransportError,
};
use skopeo_types::{ConsoleLevel, Dimensions, Headers, NetworkCategory, Rect};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, future_to_promise, spawn_local};
use web_sys::{
    Element, HtmlDocument, HtmlElement, HtmlImageElement, HtmlMediaElement,
    HtmlSourceElement, MessageEvent, MouseEvent, PerformanceObserver,
    PerformanceObserverEntryList, PerformanceResourceTiming, ScrollBehavior,
    ScrollIntoViewOptions, ScrollLogicalPosition, Window, XPathResult, XmlHttpRequest,
};

use crate::bridge::{
    CONSOLE_METHODS, TICK_INTERVAL_MS, XHR_HEADERS_KEY, XHR_METHOD_KEY, XHR_URL_KEY, json_body,
    normalize_method, url_encoded_body, xhr_response,
};

type ParentSink = JsonSink<fn(String)>;
type PageAgent = Agent<DomDocument, ParentSink, DateClock, WebStorage>;
type SharedAgent = Rc<RefCell<PageAgent>>;

/// JS function forwarding `(argumentsArray, this)` to a Rust closure, so
/// variadic page APIs and prototype methods can be replaced.
const FORWARDER_BODY: &str =
    "return function () { return handler(Array.prototype.slice.call(arguments), this); };";

type Forwarded = Closure<dyn FnMut(Array, JsValue) -> Result<JsValue, JsValue>>;

fn console_error(msg: &str) {
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(error) = Reflect::get(&console, &"error".into()) else {
        return;
    };
    let Ok(error_fn) = error.dyn_into::<Function>() else {
        return;
    };
    let _ = error_fn.call1(&console, &JsValue::from_str(msg));
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = match info.location() {
                Some(loc) => format!(
                    "skopeo agent panic at {}:{}:{}: {info}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                ),
                None => format!("skopeo agent panic: {info}"),
            };
            console_error(&msg);
        }));
    });
}

/// `String(value)`, with `undefined` spelled out.
fn js_string(value: &JsValue) -> String {
    if value.is_undefined() {
        return "undefined".to_string();
    }
    value
        .as_string()
        .unwrap_or_else(|| String::from(Array::of1(value).join("")))
}

fn error_message(error: &JsValue) -> String {
    Reflect::get(error, &"message".into())
        .ok()
        .and_then(|message| message.as_string())
        .unwrap_or_else(|| js_string(error))
}

fn field(value: &JsValue, key: &str) -> JsValue {
    if value.is_object() {
        Reflect::get(value, &key.into()).unwrap_or(JsValue::UNDEFINED)
    } else {
        JsValue::UNDEFINED
    }
}

fn forwarder(handler: &Forwarded) -> Result<Function, JsValue> {
    Function::new_with_args("handler", FORWARDER_BODY)
        .call1(&JsValue::UNDEFINED, handler.as_ref())?
        .dyn_into::<Function>()
}

fn method_of(target: &JsValue, name: &str) -> Result<Function, JsValue> {
    Reflect::get(target, &name.into())?
        .dyn_into::<Function>()
        .map_err(|_| JsValue::from_str(&format!("{name} is not a function")))
}

/// Header pairs from a `Headers` object, an iterable of pairs, or a plain
/// object.
fn header_map(value: &JsValue) -> Headers {
    let mut headers = Headers::new();
    if value.is_undefined() || value.is_null() {
        return headers;
    }
    let mut insert = |pair: JsValue| {
        let pair = Array::from(&pair);
        if let (Some(name), value) = (pair.get(0).as_string(), pair.get(1)) {
            headers.insert(name, js_string(&value));
        }
    };
    match js_sys::try_iter(value) {
        Ok(Some(entries)) => entries.flatten().for_each(&mut insert),
        _ => {
            if let Some(object) = value.dyn_ref::<Object>() {
                Object::entries(object).iter().for_each(&mut insert);
            }
        }
    }
    headers
}

fn request_body(body: &JsValue) -> Option<RequestBody> {
    if body.is_undefined() || body.is_null() {
        return None;
    }
    if let Some(text) = body.as_string() {
        return Some(RequestBody::Text(text));
    }
    if body.is_instance_of::<web_sys::FormData>() {
        return Some(RequestBody::FormData);
    }
    if let Some(params) = body.dyn_ref::<web_sys::UrlSearchParams>() {
        return Some(url_encoded_body(&String::from(params.to_string())));
    }
    if body.is_instance_of::<web_sys::Blob>()
        || body.is_instance_of::<js_sys::ArrayBuffer>()
        || js_sys::ArrayBuffer::is_view(body)
        || body.is_instance_of::<web_sys::ReadableStream>()
    {
        return Some(RequestBody::Opaque);
    }
    let serialized = JSON::stringify(body).ok().and_then(|json| json.as_string());
    Some(json_body(serialized.as_deref()))
}

/// Console arguments as the host sees them: objects as their JSON, anything
/// else as `String(value)`.
fn console_value(arg: &JsValue) -> Value {
    if arg.is_object() || arg.is_null() {
        if let Some(json) = JSON::stringify(arg).ok().and_then(|s| s.as_string()) {
            return serde_json::from_str(&json).unwrap_or(Value::String(json));
        }
    }
    Value::String(js_string(arg))
}

fn post_to_parent(json: String) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let target = match window.parent() {
        Ok(Some(parent)) => parent,
        _ => window,
    };
    match JSON::parse(&json) {
        Ok(message) => {
            let _ = target.post_message(&message, "*");
        }
        Err(error) => tracing::warn!(error = %js_string(&error), "unparsable agent message"),
    }
}

fn parent_sink() -> ParentSink {
    JsonSink::new(post_to_parent as fn(String))
}

#[derive(Debug, Clone, Copy, Default)]
struct DateClock;

impl Clock for DateClock {
    fn now_ms(&self) -> i64 {
        js_sys::Date::now() as i64
    }
}

struct DomDocument {
    window: Window,
    document: web_sys::Document,
}

impl DomDocument {
    fn collect(collection: &web_sys::HtmlCollection) -> Vec<Element> {
        (0..collection.length())
            .filter_map(|index| collection.item(index))
            .collect()
    }
}

impl Document for DomDocument {
    type Node = Element;

    fn document_element(&self) -> Option<Element> {
        self.document.document_element()
    }

    fn parent_element(&self, node: &Element) -> Option<Element> {
        node.parent_element()
    }

    fn children(&self, node: &Element) -> Vec<Element> {
        Self::collect(&node.children())
    }

    fn tag_name(&self, node: &Element) -> String {
        node.tag_name().to_ascii_lowercase()
    }

    fn attributes(&self, node: &Element) -> Vec<(String, String)> {
        let attributes = node.attributes();
        (0..attributes.length())
            .filter_map(|index| attributes.item(index))
            .map(|attr| (attr.name(), attr.value()))
            .collect()
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn inner_text(&self, node: &Element) -> String {
        match node.dyn_ref::<HtmlElement>() {
            Some(html) => html.inner_text(),
            None => node.text_content().unwrap_or_default(),
        }
    }

    fn inner_html(&self, node: &Element) -> String {
        node.inner_html()
    }

    fn bounding_rect(&self, node: &Element) -> Rect {
        let rect = node.get_bounding_client_rect();
        Rect::new(rect.x(), rect.y(), rect.width(), rect.height())
    }

    fn add_class(&mut self, node: &Element, class: &str) {
        let _ = node.class_list().add_1(class);
    }

    fn remove_class(&mut self, node: &Element, class: &str) {
        let _ = node.class_list().remove_1(class);
    }

    fn query_selector(
        &self,
        scope: &Element,
        selector: &str,
    ) -> Result<Option<Element>, LookupError> {
        scope
            .query_selector(selector)
            .map_err(|_| LookupError::invalid_selector(selector))
    }

    fn evaluate_xpath(&self, expression: &str) -> Result<Option<Element>, LookupError> {
        let result = self
            .document
            .evaluate_with_type(
                expression,
                &self.document,
                XPathResult::ORDERED_NODE_ITERATOR_TYPE,
            )
            .map_err(|_| LookupError::invalid_xpath(expression))?;
        while let Ok(Some(node)) = result.iterate_next() {
            if let Ok(element) = node.dyn_into::<Element>() {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    fn inject_style(&mut self, css: &str) {
        let Ok(style) = self.document.create_element("style") else {
            return;
        };
        style.set_text_content(Some(css));
        let parent: Option<web_sys::Node> = match self.document.head() {
            Some(head) => Some(head.into()),
            None => self.document.document_element().map(Into::into),
        };
        if let Some(parent) = parent {
            let _ = parent.append_child(&style);
        }
    }

    fn scroll_into_view(&mut self, node: &Element) {
        let options = ScrollIntoViewOptions::new();
        options.set_behavior(ScrollBehavior::Smooth);
        options.set_block(ScrollLogicalPosition::Center);
        node.scroll_into_view_with_scroll_into_view_options(&options);
    }

    fn resource_url(&self, node: &Element) -> Option<String> {
        let src = if let Some(img) = node.dyn_ref::<HtmlImageElement>() {
            img.src()
        } else if let Some(media) = node.dyn_ref::<HtmlMediaElement>() {
            media.src()
        } else if let Some(source) = node.dyn_ref::<HtmlSourceElement>() {
            source.src()
        } else {
            return None;
        };
        (!src.is_empty()).then_some(src)
    }

    fn natural_size(&self, node: &Element) -> Option<Dimensions> {
        let img = node.dyn_ref::<HtmlImageElement>()?;
        let (width, height) = (img.natural_width(), img.natural_height());
        (width > 0 && height > 0).then_some(Dimensions { width, height })
    }

    fn background_image(&self, node: &Element) -> Option<String> {
        self.window
            .get_computed_style(node)
            .ok()
            .flatten()?
            .get_property_value("background-image")
            .ok()
    }

    fn elements(&self) -> Vec<Element> {
        let Ok(all) = self.document.query_selector_all("*") else {
            return Vec::new();
        };
        (0..all.length())
            .filter_map(|index| all.item(index))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect()
    }

    fn elements_by_tag(&self, tag: &str) -> Vec<Element> {
        Self::collect(&self.document.get_elements_by_tag_name(tag))
    }
}

struct WebStorage {
    window: Window,
    document: web_sys::Document,
}

impl StorageSource for WebStorage {
    fn cookie_string(&self) -> String {
        self.document
            .dyn_ref::<HtmlDocument>()
            .and_then(|html| html.cookie().ok())
            .unwrap_or_default()
    }

    fn local_entries(&self) -> Result<Vec<(String, String)>, StorageError> {
        let denied = |error: JsValue| StorageError::AccessDenied(error_message(&error));
        let Some(storage) = self.window.local_storage().map_err(denied)? else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for index in 0..storage.length().map_err(denied)? {
            let Some(key) = storage.key(index).map_err(denied)? else {
                continue;
            };
            let value = storage.get_item(&key).map_err(denied)?.unwrap_or_default();
            entries.push((key, value));
        }
        Ok(entries)
    }
}

/// The page's original console methods. The raw arguments of the call being
/// mirrored are handed over in `pending` so the original sees the live
/// objects.
struct PageConsole {
    console: JsValue,
    originals: Vec<(ConsoleLevel, Function)>,
    pending: Rc<RefCell<Option<Array>>>,
}

impl ConsoleBackend for PageConsole {
    fn write(&self, level: ConsoleLevel, args: &[Value]) {
        let Some((_, original)) = self.originals.iter().find(|(l, _)| *l == level) else {
            return;
        };
        let raw = self.pending.borrow_mut().take().unwrap_or_else(|| {
            args.iter()
                .map(|arg| JsValue::from_str(&skopeo_agent::console::stringify_arg(arg)))
                .collect()
        });
        let _ = original.apply(&self.console, &raw);
    }
}

fn install_console(window: &Window) -> Result<(), JsValue> {
    let console = Reflect::get(window, &"console".into())?;
    let originals = CONSOLE_METHODS
        .iter()
        .filter_map(|(name, level)| Some((*level, method_of(&console, name).ok()?)))
        .collect();
    let pending = Rc::new(RefCell::new(None));
    let intercepting = Rc::new(InterceptingConsole::new(
        PageConsole {
            console: console.clone(),
            originals,
            pending: pending.clone(),
        },
        parent_sink(),
        DateClock,
    ));

    for (name, level) in CONSOLE_METHODS {
        let intercepting = intercepting.clone();
        let pending = pending.clone();
        let handler: Forwarded = Closure::new(move |args: Array, _this: JsValue| {
            let values: Vec<Value> = args.iter().map(|arg| console_value(&arg)).collect();
            *pending.borrow_mut() = Some(args);
            intercepting.emit(level, &values);
            Ok(JsValue::UNDEFINED)
        });
        Reflect::set(&console, &name.into(), &forwarder(&handler)?)?;
        handler.forget();
    }
    Ok(())
}

/// One page `fetch` call: the original promise, and how it settled.
struct PageFetch {
    pending: Promise,
    outcome: RefCell<Option<Result<JsValue, JsValue>>>,
}

impl Transport for PageFetch {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let value = match JsFuture::from(self.pending.clone()).await {
            Ok(value) => value,
            Err(error) => {
                let message = error_message(&error);
                *self.outcome.borrow_mut() = Some(Err(error));
                return Err(TransportError::new(message));
            }
        };
        *self.outcome.borrow_mut() = Some(Ok(value.clone()));
        let Some(response) = value.dyn_ref::<web_sys::Response>() else {
            return Err(TransportError::new("fetch resolved without a Response"));
        };

        let mut reply = HttpResponse::new(response.status());
        reply.headers = header_map(response.headers().as_ref());
        if reply.content_type().is_some_and(is_textual_content_type) {
            let copy = web_sys::Response::clone(response);
            if let Ok(text) = copy.and_then(|copy| copy.text()) {
                if let Some(text) = JsFuture::from(text).await.ok().and_then(|t| t.as_string()) {
                    reply = reply.with_body(text);
                }
            }
        }
        Ok(reply)
    }
}

fn fetch_request(args: &Array) -> HttpRequest {
    let input = args.get(0);
    let init = args.get(1);
    let page_request = input.dyn_ref::<web_sys::Request>();

    let url = page_request.map_or_else(|| js_string(&input), web_sys::Request::url);
    let method = normalize_method(
        field(&init, "method")
            .as_string()
            .or_else(|| page_request.map(web_sys::Request::method)),
    );
    let mut request = HttpRequest::new(method, url).category(NetworkCategory::Fetch);
    let headers = field(&init, "headers");
    request.headers = match page_request {
        Some(page_request) if headers.is_undefined() => {
            header_map(page_request.headers().as_ref())
        }
        _ => header_map(&headers),
    };
    if let Some(body) = request_body(&field(&init, "body")) {
        request = request.body(body);
    }
    request
}

fn install_fetch(window: &Window, ids: Arc<RequestIds>) -> Result<(), JsValue> {
    let original = method_of(window, "fetch")?;
    let global: JsValue = window.clone().into();
    let handler: Forwarded = Closure::new(move |args: Array, _this: JsValue| {
        let request = fetch_request(&args);
        let pending = match original.apply(&global, &args) {
            Ok(pending) => Promise::resolve(&pending),
            Err(error) => Promise::reject(&error),
        };
        let transport = InterceptingTransport::sharing(
            PageFetch {
                pending,
                outcome: RefCell::new(None),
            },
            parent_sink(),
            DateClock,
            ids.clone(),
        );
        Ok(future_to_promise(async move {
            let result = transport.send(request).await;
            let outcome = transport.inner().outcome.borrow_mut().take();
            match (outcome, result) {
                (Some(settled), _) => settled,
                (None, Err(error)) => Err(JsValue::from_str(error.message())),
                (None, Ok(_)) => Err(JsValue::from_str("fetch settled without an outcome")),
            }
        })
        .into())
    });
    Reflect::set(window, &"fetch".into(), &forwarder(&handler)?)?;
    handler.forget();
    Ok(())
}

/// One page `XMLHttpRequest`: resolved on `loadend`, or early when `send`
/// itself throws.
struct PageXhr {
    xhr: XmlHttpRequest,
    done: Promise,
    failure: RefCell<Option<String>>,
}

impl Transport for PageXhr {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let _ = JsFuture::from(self.done.clone()).await;
        let failure = self.failure.borrow_mut().take();
        if let Some(message) = failure {
            return Err(TransportError::new(message));
        }
        let headers = self.xhr.get_all_response_headers().unwrap_or_default();
        let text = self.xhr.response_text().ok().flatten();
        xhr_response(self.xhr.status().unwrap_or(0), &headers, text)
    }
}

fn install_xhr(window: &Window, ids: Arc<RequestIds>) -> Result<(), JsValue> {
    let constructor = Reflect::get(window, &"XMLHttpRequest".into())?;
    let prototype = Reflect::get(&constructor, &"prototype".into())?;
    let original_open = method_of(&prototype, "open")?;
    let original_set_header = method_of(&prototype, "setRequestHeader")?;
    let original_send = method_of(&prototype, "send")?;

    let open: Forwarded = Closure::new(move |args: Array, this: JsValue| {
        Reflect::set(&this, &XHR_METHOD_KEY.into(), &args.get(0))?;
        Reflect::set(&this, &XHR_URL_KEY.into(), &js_string(&args.get(1)).into())?;
        Reflect::set(&this, &XHR_HEADERS_KEY.into(), &Object::new())?;
        original_open.apply(&this, &args)
    });

    let set_header: Forwarded = Closure::new(move |args: Array, this: JsValue| {
        let headers = field(&this, XHR_HEADERS_KEY);
        if headers.is_object() {
            Reflect::set(&headers, &js_string(&args.get(0)).into(), &args.get(1))?;
        }
        original_set_header.apply(&this, &args)
    });

    let send: Forwarded = Closure::new(move |args: Array, this: JsValue| {
        let Some(xhr) = this.dyn_ref::<XmlHttpRequest>().cloned() else {
            return original_send.apply(&this, &args);
        };
        let mut request = HttpRequest::new(
            normalize_method(field(&this, XHR_METHOD_KEY).as_string()),
            field(&this, XHR_URL_KEY).as_string().unwrap_or_default(),
        )
        .category(NetworkCategory::Xhr);
        request.headers = header_map(&field(&this, XHR_HEADERS_KEY));
        if let Some(body) = request_body(&args.get(0)) {
            request = request.body(body);
        }

        let mut resolve = None;
        let done = Promise::new(&mut |resolve_fn, _reject| resolve = Some(resolve_fn));
        let Some(resolve) = resolve else {
            return original_send.apply(&this, &args);
        };
        xhr.add_event_listener_with_callback("loadend", &resolve)?;

        let transport = InterceptingTransport::sharing(
            PageXhr {
                xhr,
                done,
                failure: RefCell::new(None),
            },
            parent_sink(),
            DateClock,
            ids.clone(),
        );
        let sent = original_send.apply(&this, &args);
        if let Err(error) = &sent {
            *transport.inner().failure.borrow_mut() = Some(error_message(error));
            let _ = resolve.call0(&JsValue::UNDEFINED);
        }
        spawn_local(async move {
            let _ = transport.send(request).await;
        });
        sent
    });

    for (name, handler) in [("open", open), ("setRequestHeader", set_header), ("send", send)] {
        Reflect::set(&prototype, &name.into(), &forwarder(&handler)?)?;
        handler.forget();
    }
    Ok(())
}

fn install_resource_observer() -> Result<(), JsValue> {
    let observer = Rc::new(ResourceObserver::new(parent_sink(), DateClock));
    let callback = Closure::<dyn FnMut(PerformanceObserverEntryList)>::new(
        move |list: PerformanceObserverEntryList| {
            for entry in list.get_entries().iter() {
                let Ok(timing) = entry.dyn_into::<PerformanceResourceTiming>() else {
                    continue;
                };
                observer.observe(&ResourceEntry {
                    name: timing.name(),
                    initiator_type: timing.initiator_type(),
                    duration: timing.duration(),
                });
            }
        },
    );
    let performance_observer = PerformanceObserver::new(callback.as_ref().unchecked_ref())?;
    let options = Object::new();
    Reflect::set(&options, &"entryTypes".into(), &Array::of1(&"resource".into()))?;
    method_of(&performance_observer, "observe")?.call1(&performance_observer, &options)?;
    callback.forget();
    Ok(())
}

fn event_element(event: &web_sys::Event) -> Option<Element> {
    event.target()?.dyn_into::<Element>().ok()
}

fn install_pointer_listeners(
    document: &web_sys::Document,
    agent: &SharedAgent,
) -> Result<(), JsValue> {
    let over = {
        let agent = agent.clone();
        Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| {
            if let (Some(node), Ok(mut agent)) = (event_element(&event), agent.try_borrow_mut()) {
                agent.pointer_over(&node);
            }
        })
    };
    let out = {
        let agent = agent.clone();
        Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| {
            if let (Some(node), Ok(mut agent)) = (event_element(&event), agent.try_borrow_mut()) {
                agent.pointer_out(&node);
            }
        })
    };
    let click = {
        let agent = agent.clone();
        Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| {
            let (Some(node), Ok(mut agent)) = (event_element(&event), agent.try_borrow_mut()) else {
                return;
            };
            if agent.click(&node) == ClickOutcome::Captured {
                event.prevent_default();
                event.stop_propagation();
            }
        })
    };

    for (kind, listener) in [("mouseover", over), ("mouseout", out), ("click", click)] {
        document.add_event_listener_with_callback_and_bool(
            kind,
            listener.as_ref().unchecked_ref(),
            true,
        )?;
        listener.forget();
    }
    Ok(())
}

fn install_message_listener(window: &Window, agent: &SharedAgent) -> Result<(), JsValue> {
    let agent = agent.clone();
    let listener = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        let data = event.data();
        let raw = data
            .as_string()
            .or_else(|| JSON::stringify(&data).ok().and_then(|json| json.as_string()));
        if let (Some(raw), Ok(mut agent)) = (raw, agent.try_borrow_mut()) {
            agent.handle_raw(&raw);
        }
    });
    window.add_event_listener_with_callback("message", listener.as_ref().unchecked_ref())?;
    listener.forget();
    Ok(())
}

fn install_load_hook(
    window: &Window,
    document: &web_sys::Document,
    agent: &SharedAgent,
) -> Result<(), JsValue> {
    if document.ready_state() == "complete" {
        agent.borrow_mut().on_load();
        return Ok(());
    }
    let agent = agent.clone();
    let listener = Closure::<dyn FnMut()>::new(move || {
        if let Ok(mut agent) = agent.try_borrow_mut() {
            agent.on_load();
        }
    });
    window.add_event_listener_with_callback("load", listener.as_ref().unchecked_ref())?;
    listener.forget();
    Ok(())
}

fn install_ticker(agent: &SharedAgent) {
    let agent = agent.clone();
    Interval::new(TICK_INTERVAL_MS, move || {
        if let Ok(mut agent) = agent.try_borrow_mut() {
            agent.tick();
        }
    })
    .forget();
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    install_panic_hook();
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;

    let agent: SharedAgent = Rc::new(RefCell::new(Agent::install(
        DomDocument {
            window: window.clone(),
            document: document.clone(),
        },
        parent_sink(),
        DateClock,
        WebStorage {
            window: window.clone(),
            document: document.clone(),
        },
    )));

    install_console(&window)?;
    let ids = Arc::new(RequestIds::new("req"));
    install_fetch(&window, ids.clone())?;
    install_xhr(&window, ids)?;
    if let Err(error) = install_resource_observer() {
        tracing::warn!(error = %error_message(&error), "resource timing unavailable");
    }
    install_pointer_listeners(&document, &agent)?;
    install_message_listener(&window, &agent)?;
    install_load_hook(&window, &document, &agent)?;
    install_ticker(&agent);
    Ok(())
}
