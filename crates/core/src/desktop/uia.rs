//! Windows UI Automation backend.
//!
//! Every call runs on the blocking pool with its own COM apartment and
//! automation client. Handles cross threads as plain integers.

use async_trait::async_trait;
use tracing::debug;
use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::System::Com::*;
use windows::Win32::UI::Accessibility::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use super::{ControlOutcome, DesktopBackend, DesktopError, WindowHandle, WindowInfo};

const BUTTON: i32 = 50000;
const EDIT: i32 = 50004;
const LIST_ITEM: i32 = 50007;
const TEXT: i32 = 50020;
const DOCUMENT: i32 = 50030;

/// Native backend over `IUIAutomation`.
#[derive(Debug, Default)]
pub struct UiaDesktop;

impl UiaDesktop {
    pub fn new() -> Self {
        Self
    }
}

fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as *mut _)
}

async fn blocking<T, F>(op: F) -> Result<T, DesktopError>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, DesktopError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(DesktopError::backend)?
}

unsafe fn automation() -> std::result::Result<IUIAutomation, DesktopError> {
    let _ = CoInitializeEx(None, COINIT_MULTITHREADED);
    CoCreateInstance::<_, IUIAutomation>(&CUIAutomation8, None, CLSCTX_INPROC_SERVER)
        .map_err(DesktopError::backend)
}

unsafe fn root_of(
    uia: &IUIAutomation,
    handle: WindowHandle,
) -> std::result::Result<IUIAutomationElement, DesktopError> {
    if !IsWindow(hwnd(handle)).as_bool() {
        return Err(DesktopError::WindowGone(handle));
    }
    uia.ElementFromHandle(hwnd(handle))
        .map_err(DesktopError::backend)
}

unsafe fn named_of_type(
    uia: &IUIAutomation,
    name: &str,
    control_type: i32,
) -> std::result::Result<IUIAutomationCondition, DesktopError> {
    let by_name = uia
        .CreatePropertyCondition(UIA_NamePropertyId, &VARIANT::from(BSTR::from(name)))
        .map_err(DesktopError::backend)?;
    let by_type = uia
        .CreatePropertyCondition(UIA_ControlTypePropertyId, &VARIANT::from(control_type))
        .map_err(DesktopError::backend)?;
    uia.CreateAndCondition(&by_name, &by_type)
        .map_err(DesktopError::backend)
}

unsafe fn of_type(
    uia: &IUIAutomation,
    control_type: i32,
) -> std::result::Result<IUIAutomationCondition, DesktopError> {
    uia.CreatePropertyCondition(UIA_ControlTypePropertyId, &VARIANT::from(control_type))
        .map_err(DesktopError::backend)
}

unsafe fn names_of(array: &IUIAutomationElementArray) -> Vec<String> {
    let len = array.Length().unwrap_or(0);
    (0..len)
        .filter_map(|i| array.GetElement(i).ok())
        .filter_map(|e| e.CurrentName().ok())
        .map(|n| n.to_string())
        .filter(|n| !n.trim().is_empty())
        .collect()
}

unsafe extern "system" fn collect_cb(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<isize>);
    handles.push(hwnd.0 as isize);
    TRUE
}

unsafe fn window_info(raw: isize) -> WindowInfo {
    let h = HWND(raw as *mut _);
    let mut title = [0u16; 512];
    let len = GetWindowTextW(h, &mut title).max(0) as usize;
    let mut class = [0u16; 256];
    let class_len = GetClassNameW(h, &mut class).max(0) as usize;
    WindowInfo {
        handle: WindowHandle(raw),
        title: String::from_utf16_lossy(&title[..len]),
        class_name: String::from_utf16_lossy(&class[..class_len]),
        visible: IsWindowVisible(h).as_bool(),
    }
}

#[async_trait]
impl DesktopBackend for UiaDesktop {
    fn name(&self) -> &str {
        "uia"
    }

    async fn list_windows(&self) -> std::result::Result<Vec<WindowInfo>, DesktopError> {
        blocking(|| unsafe {
            let mut handles: Vec<isize> = Vec::new();
            let _ = EnumWindows(
                Some(collect_cb),
                LPARAM(&mut handles as *mut Vec<isize> as isize),
            );
            Ok(handles
                .into_iter()
                .map(|raw| window_info(raw))
                .filter(|w| !w.title.trim().is_empty())
                .collect())
        })
        .await
    }

    async fn is_alive(&self, handle: WindowHandle) -> bool {
        blocking(move || unsafe { Ok(IsWindow(hwnd(handle)).as_bool()) })
            .await
            .unwrap_or(false)
    }

    async fn focus(&self, handle: WindowHandle) -> std::result::Result<(), DesktopError> {
        blocking(move || unsafe {
            if !IsWindow(hwnd(handle)).as_bool() {
                return Err(DesktopError::WindowGone(handle));
            }
            if !SetForegroundWindow(hwnd(handle)).as_bool() {
                debug!(window = %handle, "SetForegroundWindow refused");
            }
            Ok(())
        })
        .await
    }

    async fn invoke_control(
        &self,
        handle: WindowHandle,
        name: &str,
    ) -> std::result::Result<ControlOutcome, DesktopError> {
        let name = name.to_string();
        blocking(move || unsafe {
            let uia = automation()?;
            let root = root_of(&uia, handle)?;
            let cond = named_of_type(&uia, &name, BUTTON)?;
            let Ok(button) = root.FindFirst(TreeScope_Descendants, &cond) else {
                return Ok(ControlOutcome::Missing);
            };
            if !button.CurrentIsEnabled().map(|b| b.as_bool()).unwrap_or(false) {
                return Ok(ControlOutcome::Disabled);
            }
            let invoke = button
                .GetCurrentPattern(UIA_InvokePatternId)
                .and_then(|p| p.cast::<IUIAutomationInvokePattern>())
                .map_err(DesktopError::backend)?;
            invoke.Invoke().map_err(DesktopError::backend)?;
            Ok(ControlOutcome::Invoked)
        })
        .await
    }

    async fn list_targets(&self, handle: WindowHandle) -> std::result::Result<Vec<String>, DesktopError> {
        blocking(move || unsafe {
            let uia = automation()?;
            let root = root_of(&uia, handle)?;
            let cond = of_type(&uia, LIST_ITEM)?;
            match root.FindAll(TreeScope_Descendants, &cond) {
                Ok(items) => Ok(names_of(&items)),
                Err(_) => Ok(Vec::new()),
            }
        })
        .await
    }

    async fn select_target(&self, handle: WindowHandle, name: &str) -> std::result::Result<bool, DesktopError> {
        let name = name.to_string();
        blocking(move || unsafe {
            let uia = automation()?;
            let root = root_of(&uia, handle)?;
            let cond = named_of_type(&uia, &name, LIST_ITEM)?;
            let Ok(item) = root.FindFirst(TreeScope_Descendants, &cond) else {
                return Ok(false);
            };
            let selection = item
                .GetCurrentPattern(UIA_SelectionItemPatternId)
                .and_then(|p| p.cast::<IUIAutomationSelectionItemPattern>())
                .map_err(DesktopError::backend)?;
            selection.Select().map_err(DesktopError::backend)?;
            Ok(true)
        })
        .await
    }

    async fn set_field(
        &self,
        handle: WindowHandle,
        field: &str,
        text: &str,
    ) -> std::result::Result<bool, DesktopError> {
        let field = field.to_string();
        let text = text.to_string();
        blocking(move || unsafe {
            let uia = automation()?;
            let root = root_of(&uia, handle)?;
            let cond = named_of_type(&uia, &field, EDIT)?;
            let Ok(edit) = root.FindFirst(TreeScope_Descendants, &cond) else {
                return Ok(false);
            };
            let value = edit
                .GetCurrentPattern(UIA_ValuePatternId)
                .and_then(|p| p.cast::<IUIAutomationValuePattern>())
                .map_err(DesktopError::backend)?;
            value
                .SetValue(&BSTR::from(text.as_str()))
                .map_err(DesktopError::backend)?;
            Ok(true)
        })
        .await
    }

    async fn read_text(&self, handle: WindowHandle) -> std::result::Result<String, DesktopError> {
        blocking(move || unsafe {
            let uia = automation()?;
            let root = root_of(&uia, handle)?;

            let document = of_type(&uia, DOCUMENT)?;
            if let Ok(doc) = root.FindFirst(TreeScope_Descendants, &document) {
                let text = doc
                    .GetCurrentPattern(UIA_TextPatternId)
                    .and_then(|p| p.cast::<IUIAutomationTextPattern>())
                    .and_then(|p| p.DocumentRange())
                    .and_then(|r| r.GetText(-1));
                if let Ok(text) = text {
                    let text = text.to_string();
                    if !text.trim().is_empty() {
                        return Ok(text);
                    }
                }
            }

            let texts = of_type(&uia, TEXT)?;
            match root.FindAll(TreeScope_Descendants, &texts) {
                Ok(items) => Ok(names_of(&items).join("\n")),
                Err(_) => Ok(String::new()),
            }
        })
        .await
    }

    async fn close_window(&self, handle: WindowHandle) -> std::result::Result<(), DesktopError> {
        blocking(move || unsafe {
            PostMessageW(hwnd(handle), WM_CLOSE, WPARAM(0), LPARAM(0))
                .map_err(DesktopError::backend)
        })
        .await
    }
}
