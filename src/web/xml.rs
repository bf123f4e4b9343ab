use xml::reader::{EventReader, XmlEvent};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::media::{MediaManager, Node, RawUrlKind};

/// XML escape helper
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseFlag {
    Metadata,
    DirectChildren,
}

/// Arguments of a ContentDirectory `Browse` action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseRequest {
    pub object_id: String,
    pub browse_flag: BrowseFlag,
    pub starting_index: usize,
    /// 0 requests every remaining child
    pub requested_count: usize,
}

/// Read the arguments of a SOAP `Browse` envelope
pub fn parse_browse_request(body: &str) -> Result<BrowseRequest, AppError> {
    let mut object_id = None;
    let mut browse_flag = None;
    let mut starting_index = 0;
    let mut requested_count = 0;
    let mut is_browse = false;

    let mut current = String::new();
    let mut text = String::new();

    for event in EventReader::from_str(body) {
        let event = event.map_err(|e| AppError::BadRequest(format!("malformed SOAP body: {}", e)))?;
        match event {
            XmlEvent::StartElement { name, .. } => {
                if name.local_name == "Browse" {
                    is_browse = true;
                }
                current = name.local_name;
                text.clear();
            }
            XmlEvent::Characters(chars) | XmlEvent::CData(chars) => text.push_str(&chars),
            XmlEvent::EndElement { name } => {
                if name.local_name == current {
                    let value = text.trim();
                    match current.as_str() {
                        "ObjectID" => object_id = Some(value.to_string()),
                        "BrowseFlag" => {
                            browse_flag = match value {
                                "BrowseMetadata" => Some(BrowseFlag::Metadata),
                                "BrowseDirectChildren" => Some(BrowseFlag::DirectChildren),
                                other => {
                                    return Err(AppError::BadRequest(format!("unknown BrowseFlag {}", other)))
                                }
                            }
                        }
                        "StartingIndex" => starting_index = value.parse().unwrap_or(0),
                        "RequestedCount" => requested_count = value.parse().unwrap_or(0),
                        _ => {}
                    }
                }
                current.clear();
                text.clear();
            }
            _ => {}
        }
    }

    if !is_browse {
        return Err(AppError::BadRequest("not a Browse action".to_string()));
    }

    Ok(BrowseRequest {
        object_id: object_id.ok_or_else(|| AppError::BadRequest("missing ObjectID".to_string()))?,
        browse_flag: browse_flag.ok_or_else(|| AppError::BadRequest("missing BrowseFlag".to_string()))?,
        starting_index,
        requested_count,
    })
}

/// Get the appropriate UPnP class for a given MIME type.
fn get_upnp_class(mime_type: &str) -> &'static str {
    if mime_type.starts_with("video/") {
        "object.item.videoItem"
    } else if mime_type.starts_with("audio/") {
        "object.item.audioItem"
    } else if mime_type.starts_with("image/") {
        "object.item.imageItem"
    } else {
        "object.item"
    }
}

pub fn generate_description_xml(config: &AppConfig) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
    <specVersion><major>1</major><minor>0</minor></specVersion>
    <device>
        <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
        <friendlyName>{}</friendlyName>
        <manufacturer>MediaLink</manufacturer>
        <modelName>MediaLink Media Server</modelName>
        <modelNumber>{}</modelNumber>
        <UDN>uuid:{}</UDN>
        <serviceList>
            <service>
                <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
                <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
                <SCPDURL>/ContentDirectory.xml</SCPDURL>
                <controlURL>/control/ContentDirectory</controlURL>
                <eventSubURL>/event/ContentDirectory</eventSubURL>
            </service>
        </serviceList>
    </device>
</root>"#,
        xml_escape(&config.server.name),
        env!("CARGO_PKG_VERSION"),
        config.server.uuid
    )
}

pub fn generate_scpd_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
    <specVersion><major>1</major><minor>0</minor></specVersion>
    <actionList>
        <action>
            <name>Browse</name>
            <argumentList>
                <argument><name>ObjectID</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_ObjectID</relatedStateVariable></argument>
                <argument><name>BrowseFlag</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_BrowseFlag</relatedStateVariable></argument>
                <argument><name>Filter</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_Filter</relatedStateVariable></argument>
                <argument><name>StartingIndex</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_Index</relatedStateVariable></argument>
                <argument><name>RequestedCount</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_Count</relatedStateVariable></argument>
                <argument><name>SortCriteria</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_SortCriteria</relatedStateVariable></argument>
                <argument><name>Result</name><direction>out</direction><relatedStateVariable>A_ARG_TYPE_Result</relatedStateVariable></argument>
                <argument><name>NumberReturned</name><direction>out</direction><relatedStateVariable>A_ARG_TYPE_Count</relatedStateVariable></argument>
                <argument><name>TotalMatches</name><direction>out</direction><relatedStateVariable>A_ARG_TYPE_Count</relatedStateVariable></argument>
                <argument><name>UpdateID</name><direction>out</direction><relatedStateVariable>A_ARG_TYPE_UpdateID</relatedStateVariable></argument>
            </argumentList>
        </action>
    </actionList>
    <serviceStateTable>
        <stateVariable sendEvents="no"><name>A_ARG_TYPE_ObjectID</name><dataType>string</dataType></stateVariable>
        <stateVariable sendEvents="no"><name>A_ARG_TYPE_BrowseFlag</name><dataType>string</dataType><allowedValueList><allowedValue>BrowseMetadata</allowedValue><allowedValue>BrowseDirectChildren</allowedValue></allowedValueList></stateVariable>
        <stateVariable sendEvents="no"><name>A_ARG_TYPE_Filter</name><dataType>string</dataType></stateVariable>
        <stateVariable sendEvents="no"><name>A_ARG_TYPE_Index</name><dataType>ui4</dataType></stateVariable>
        <stateVariable sendEvents="no"><name>A_ARG_TYPE_Count</name><dataType>ui4</dataType></stateVariable>
        <stateVariable sendEvents="no"><name>A_ARG_TYPE_SortCriteria</name><dataType>string</dataType></stateVariable>
        <stateVariable sendEvents="no"><name>A_ARG_TYPE_Result</name><dataType>string</dataType></stateVariable>
        <stateVariable sendEvents="no"><name>A_ARG_TYPE_UpdateID</name><dataType>ui4</dataType></stateVariable>
    </serviceStateTable>
</scpd>"#
}

fn didl_node(node: &Node, manager: &MediaManager, didl: &mut String) {
    let id = xml_escape(node.id());
    let parent_id = xml_escape(node.parent_id());
    let title = xml_escape(node.name());
    let date = node
        .modified()
        .map(|date| format!("<dc:date>{}</dc:date>", date.format("%Y-%m-%dT%H:%M:%S")))
        .unwrap_or_default();

    match node {
        Node::Folder(_) => {
            didl.push_str(&format!(
                r#"<container id="{id}" parentID="{parent_id}" restricted="1"><dc:title>{title}</dc:title>{date}<upnp:class>object.container.storageFolder</upnp:class></container>"#
            ));
        }
        Node::Content(content) => {
            let mime = content.mime_type.as_str();
            didl.push_str(&format!(
                r#"<item id="{id}" parentID="{parent_id}" restricted="1"><dc:title>{title}</dc:title>{date}<upnp:class>{class}</upnp:class><res protocolInfo="http-get:*:{mime}:*" size="{size}">{url}</res></item>"#,
                class = get_upnp_class(mime),
                mime = xml_escape(mime),
                size = content.size,
                url = xml_escape(&manager.get_node_url(node)),
            ));
        }
        Node::RawUrl(raw) => {
            let mime = raw.mime_type.as_ref().map(|m| m.as_str()).unwrap_or("*");
            let class = match raw.kind {
                RawUrlKind::RadioStation => "object.item.audioItem.audioBroadcast",
                _ => get_upnp_class(mime),
            };
            let duration = raw
                .duration
                .as_deref()
                .map(|d| format!(r#" duration="{}""#, xml_escape(d)))
                .unwrap_or_default();
            let icon = raw
                .icon_url
                .as_deref()
                .map(|url| format!("<upnp:albumArtURI>{}</upnp:albumArtURI>", xml_escape(url)))
                .unwrap_or_default();
            didl.push_str(&format!(
                r#"<item id="{id}" parentID="{parent_id}" restricted="1"><dc:title>{title}</dc:title>{date}{icon}<upnp:class>{class}</upnp:class><res protocolInfo="http-get:*:{mime}:*"{duration}>{url}</res></item>"#,
                mime = xml_escape(mime),
                url = xml_escape(&raw.url),
            ));
        }
    }
}

/// DIDL-Lite document for a list of nodes
pub fn generate_didl(nodes: &[Node], manager: &MediaManager) -> String {
    let mut didl = String::from(
        r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">"#,
    );
    for node in nodes {
        didl_node(node, manager, &mut didl);
    }
    didl.push_str("</DIDL-Lite>");
    didl
}

pub fn generate_browse_response(didl: &str, number_returned: usize, total_matches: usize) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
    <s:Body>
        <u:BrowseResponse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
            <Result>{}</Result>
            <NumberReturned>{}</NumberReturned>
            <TotalMatches>{}</TotalMatches>
            <UpdateID>0</UpdateID>
        </u:BrowseResponse>
    </s:Body>
</s:Envelope>"#,
        xml_escape(didl),
        number_returned,
        total_matches
    )
}

/// UPnP error envelope, e.g. 701 for an unknown object
pub fn generate_soap_fault(code: u16, description: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
    <s:Body>
        <s:Fault>
            <faultcode>s:Client</faultcode>
            <faultstring>UPnPError</faultstring>
            <detail>
                <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                    <errorCode>{}</errorCode>
                    <errorDescription>{}</errorDescription>
                </UPnPError>
            </detail>
        </s:Fault>
    </s:Body>
</s:Envelope>"#,
        code,
        xml_escape(description)
    )
}
