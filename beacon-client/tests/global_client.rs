//! The process-wide accessor. One test per binary: the holder is a static.

mod common;

use beacon_client::{global, ClientError};
use beacon_core::ConfigValue;

use common::{builder, options};

#[tokio::test]
async fn install_once_then_read_through_instance() {
    assert!(matches!(global::instance(), Err(ClientError::Uninitialized)));

    let client = builder(options().with_namespace("svc")).build().expect("client");
    let installed = global::install(client).expect("first install");
    assert_eq!(installed.namespace(), "svc");
    installed.start().expect("start");

    let again = builder(options()).build().expect("client");
    assert!(matches!(
        global::install(again),
        Err(ClientError::AlreadyInitialized)
    ));
    assert!(matches!(
        global::init(options()),
        Err(ClientError::AlreadyInitialized)
    ));

    let held = global::instance().expect("installed");
    held.upsert("x", "global", None).await.expect("local write");
    assert_eq!(
        held.get("x").await.expect("ready"),
        Some(ConfigValue::from("global"))
    );
}
