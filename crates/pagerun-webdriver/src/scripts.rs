//! In-page scripts. Each takes its inputs through `arguments`.

/// `(limit)` -> `{ text, truncated }` with the visible text cut at `limit` chars.
pub const PAGE_TEXT: &str = r#"
const full = document.body ? (document.body.innerText || '') : '';
return { text: full.slice(0, arguments[0]), truncated: full.length > arguments[0] };
"#;

/// `(limit, drain)` -> console errors since the last drain, newest `limit`
/// kept. With `drain` false the hook is only installed.
///
/// The first call on a document installs the hook, so errors logged before
/// it are not seen.
pub const CONSOLE_ERRORS: &str = r#"
const [limit, drain] = arguments;
if (!window.__pagerunConsole) {
  const buffer = [];
  const push = (text) => { buffer.push(String(text)); if (buffer.length > 100) buffer.shift(); };
  const original = console.error;
  console.error = function (...args) {
    push(args.map(a => (a && a.message) ? a.message : String(a)).join(' '));
    return original.apply(console, args);
  };
  window.addEventListener('error', e => push(e.message || 'script error'));
  window.addEventListener('unhandledrejection', e => push('unhandled rejection: ' + (e.reason && e.reason.message || e.reason)));
  window.__pagerunConsole = buffer;
}
if (!drain) return [];
const drained = window.__pagerunConsole.splice(0);
return limit > 0 ? drained.slice(-limit) : [];
"#;

/// `(x, y)` or `(null, null, selector)` -> target report.
pub const PROBE: &str = r#"
const [x, y, selector] = arguments;
const el = selector ? document.querySelector(selector) : document.elementFromPoint(x, y);
if (!el) return { exists: false, visible: false, enabled: false, in_viewport: false };
const rect = el.getBoundingClientRect();
const style = window.getComputedStyle(el);
const visible = style.display !== 'none' && style.visibility !== 'hidden'
  && style.opacity !== '0' && rect.width > 0 && rect.height > 0;
const disabled = el.disabled === true || el.getAttribute('aria-disabled') === 'true'
  || style.pointerEvents === 'none';
const in_viewport = rect.bottom > 0 && rect.right > 0
  && rect.top < window.innerHeight && rect.left < window.innerWidth;
const label = (el.getAttribute('aria-label') || el.innerText || el.value || '').trim().slice(0, 40);
const tag = (el.tagName || '').toLowerCase();
return { exists: true, visible, enabled: !disabled, in_viewport,
  description: label ? `<${tag}> ${label}` : `<${tag}>` };
"#;

/// `(x, y)` -> whether an element was tagged with `data-pagerun-target`.
pub const MARK_POINT: &str = r#"
document.querySelectorAll('[data-pagerun-target]').forEach(e => e.removeAttribute('data-pagerun-target'));
const el = document.elementFromPoint(arguments[0], arguments[1]);
if (!el) return false;
el.setAttribute('data-pagerun-target', '1');
return true;
"#;

/// Selector for the element tagged by [`MARK_POINT`].
pub const MARKED: &str = "[data-pagerun-target='1']";

/// `(x, y, by, value)` -> selected option text, or null.
pub const SELECT_AT_POINT: &str = r#"
const [x, y, by, value] = arguments;
let el = document.elementFromPoint(x, y);
while (el && el.tagName !== 'SELECT') el = el.parentElement;
if (!el) return null;
const options = Array.from(el.options);
const option = by === 'index' ? options[Number(value)]
  : options.find(o => by === 'label' ? o.label.trim() === value : o.value === value);
if (!option) return null;
el.value = option.value;
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
return option.label;
"#;

/// `(dx, dy)` -> scroll offsets after scrolling.
pub const SCROLL_BY: &str = r#"
const [dx, dy] = arguments;
window.scrollBy(dx, dy);
return { x: window.scrollX, y: window.scrollY };
"#;

/// `(x, y)`, or `(null)` for the focused element; clears its value.
pub const CLEAR_AT_POINT: &str = r#"
const el = arguments[0] === null ? document.activeElement : document.elementFromPoint(arguments[0], arguments[1]);
if (el && 'value' in el) {
  el.value = '';
  el.dispatchEvent(new Event('input', { bubbles: true }));
}
"#;
