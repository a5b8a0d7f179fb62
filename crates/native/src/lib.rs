//! JNI bridge for the USB authorization app
//!
//! Exposes `blockUsbDataTransfer` / `allowUsbDataTransfer` to both
//! `MainActivity` and `PasswordDialogActivity`. Both activities share the same
//! export bodies. `nativeInit` is optional and selects the backend
//! configured in the app's `settings.toml`.

pub mod bridge;

use jni::JNIEnv;
use jni::objects::{JObject, JString};
use jni::sys::{JNI_FALSE, JNI_TRUE, jboolean};
use std::path::PathBuf;
use tracing::error;

fn to_jboolean(value: bool) -> jboolean {
    if value { JNI_TRUE } else { JNI_FALSE }
}

// Shared by the MainActivity exports and their PasswordDialogActivity aliases
fn block_export() -> jboolean {
    to_jboolean(bridge::catch_panic(
        "blockUsbDataTransfer",
        bridge::block_usb_data_transfer,
    ))
}

fn allow_export() -> jboolean {
    to_jboolean(bridge::catch_panic(
        "allowUsbDataTransfer",
        bridge::allow_usb_data_transfer,
    ))
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_usbauth_MainActivity_blockUsbDataTransfer<'local>(
    _env: JNIEnv<'local>,
    _thiz: JObject<'local>,
) -> jboolean {
    block_export()
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_usbauth_MainActivity_allowUsbDataTransfer<'local>(
    _env: JNIEnv<'local>,
    _thiz: JObject<'local>,
) -> jboolean {
    allow_export()
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_usbauth_PasswordDialogActivity_blockUsbDataTransfer<'local>(
    _env: JNIEnv<'local>,
    _thiz: JObject<'local>,
) -> jboolean {
    block_export()
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_usbauth_PasswordDialogActivity_allowUsbDataTransfer<'local>(
    _env: JNIEnv<'local>,
    _thiz: JObject<'local>,
) -> jboolean {
    allow_export()
}

/// `boolean nativeInit(String filesDir)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_usbauth_MainActivity_nativeInit<'local>(
    mut env: JNIEnv<'local>,
    _thiz: JObject<'local>,
    files_dir: JString<'local>,
) -> jboolean {
    let dir: String = match env.get_string(&files_dir) {
        Ok(dir) => dir.into(),
        Err(e) => {
            error!("nativeInit: invalid files directory: {}", e);
            return JNI_FALSE;
        }
    };

    to_jboolean(bridge::catch_panic("nativeInit", || {
        match bridge::init_from_dir(&PathBuf::from(dir)) {
            Ok(()) => true,
            Err(e) => {
                error!("nativeInit failed: {:#}", e);
                false
            }
        }
    }))
}
