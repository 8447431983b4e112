//! Browser binding for the skopeo agent.
//!
//! Built to WebAssembly and loaded into every proxied page by the agent
//! loader script. On start it implements the [`skopeo_agent`] platform
//! traits over the live page and wires them up:
//!
//! - pointer events (`mouseover`, `mouseout`, `click`) drive selection,
//! - `message` events from the viewing surface are host commands,
//! - `fetch` and `XMLHttpRequest` are wrapped so every call is reported,
//! - a resource-timing observer reports scripts, styles, images and media,
//! - `console.log/info/warn/error` are mirrored,
//! - the document `load` event schedules the first media scan.
//!
//! Outbound messages go to `window.parent` as structured objects.
//!
//! Build into the directory the proxy serves the agent from, next to the
//! loader `public/js/inspect-script.js`:
//!
//! ```text
//! cargo build -p skopeo-agent-wasm --release --target wasm32-unknown-unknown
//! wasm-bindgen --target no-modules --no-typescript --out-dir public/js \
//!     target/wasm32-unknown-unknown/release/skopeo_agent_wasm.wasm
//! ```

#[cfg(target_arch = "wasm32")]
mod wasm;

// Pure helpers shared by the wasm module and native tests.
#[cfg(any(target_arch = "wasm32", test))]
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
mod bridge;
