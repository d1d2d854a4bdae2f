//! Tests for request envelope encoding.

use rstest::{fixture, rstest};

use crate::api::{
    ApiCall, CreateServerCall, CreateStorageCall, DataCenterId, Operation, ServerId, StorageId,
};

#[fixture]
fn storage_call() -> CreateStorageCall {
    CreateStorageCall {
        data_center_id: DataCenterId::new("dc-1"),
        storage_name: String::from("node-1-storage"),
        size_gb: 20,
        image_id: String::from("img-42"),
        image_password: String::from("pw"),
    }
}

#[rstest]
fn list_data_centers_envelope_names_the_operation() {
    let xml = ApiCall::ListDataCenters.to_xml().expect("encode");

    assert!(xml.starts_with("<soapenv:Envelope"), "root element: {xml}");
    assert!(
        xml.contains("xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\""),
        "envelope namespace: {xml}"
    );
    assert!(
        xml.contains("xmlns:ws=\"http://ws.api.profitbricks.com/\""),
        "service namespace: {xml}"
    );
    assert!(xml.contains("<soapenv:Body>"), "body: {xml}");
    assert!(xml.contains("<ws:getAllDataCenters/>"), "operation: {xml}");
}

#[rstest]
fn create_storage_envelope_carries_every_parameter(storage_call: CreateStorageCall) {
    let xml = ApiCall::CreateStorage(storage_call).to_xml().expect("encode");

    for expected in [
        "<ws:createStorage>",
        "<request>",
        "<dataCenterId>dc-1</dataCenterId>",
        "<storageName>node-1-storage</storageName>",
        "<size>20</size>",
        "<mountImageId>img-42</mountImageId>",
        "<profitBricksImagePassword>pw</profitBricksImagePassword>",
    ] {
        assert!(xml.contains(expected), "missing {expected}: {xml}");
    }
}

#[rstest]
fn create_server_envelope_carries_memory_in_megabytes() {
    let call = CreateServerCall {
        data_center_id: DataCenterId::new("dc-1"),
        server_name: String::from("node-1"),
        cores: 2,
        ram_mb: 2048,
        boot_storage_id: StorageId::new("st-1"),
        internet_access: true,
        hot_plug: true,
    };
    let xml = ApiCall::CreateServer(call).to_xml().expect("encode");

    for expected in [
        "<ws:createServer>",
        "<serverName>node-1</serverName>",
        "<cores>2</cores>",
        "<ram>2048</ram>",
        "<bootFromStorageId>st-1</bootFromStorageId>",
        "<internetAccess>true</internetAccess>",
        "<nicHotUnPlug>true</nicHotUnPlug>",
        "<discVirtioHotPlug>true</discVirtioHotPlug>",
    ] {
        assert!(xml.contains(expected), "missing {expected}: {xml}");
    }
}

#[rstest]
fn text_values_are_escaped(mut storage_call: CreateStorageCall) {
    storage_call.storage_name = String::from("a<b>&c");
    let xml = ApiCall::CreateStorage(storage_call).to_xml().expect("encode");

    assert!(!xml.contains("a<b>"), "raw markup leaked into request: {xml}");
    assert!(xml.contains("a&lt;b&gt;&amp;c"), "escaped name: {xml}");
}

#[rstest]
#[case::get(ApiCall::GetServer(ServerId::new("srv-9")), "<ws:getServer><serverId>srv-9</serverId></ws:getServer>")]
#[case::delete_server(ApiCall::DeleteServer(ServerId::new("srv-9")), "<ws:deleteServer><serverId>srv-9</serverId></ws:deleteServer>")]
#[case::delete_storage(ApiCall::DeleteStorage(StorageId::new("st-3")), "<ws:deleteStorage><storageId>st-3</storageId></ws:deleteStorage>")]
fn single_id_calls_wrap_the_identifier(#[case] call: ApiCall, #[case] expected: &str) {
    let xml = call.to_xml().expect("encode");
    assert!(xml.contains(expected), "expected {expected} in {xml}");
}

#[rstest]
#[case(ApiCall::ListDataCenters, Operation::ListDataCenters, "getAllDataCenters")]
#[case(ApiCall::GetServer(ServerId::new("x")), Operation::GetServer, "getServer")]
#[case(ApiCall::DeleteStorage(StorageId::new("x")), Operation::DeleteStorage, "deleteStorage")]
fn calls_report_their_operation(
    #[case] call: ApiCall,
    #[case] operation: Operation,
    #[case] soap_name: &str,
) {
    assert_eq!(call.operation(), operation);
    assert_eq!(operation.soap_name(), soap_name);
    assert_eq!(operation.to_string(), soap_name);
}
