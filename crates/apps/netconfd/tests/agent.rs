use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use netconf_daemon::handlers::build_registry;
use netconf_daemon::store::ConfigStore;
use netconf_daemon::transport::{send_frame, serve, FrameReader};
use netconf_proto::Server;
use netconf_xml::{parse, XmlElement};

const CLIENT_HELLO: &str = "<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\
<capabilities><capability>urn:ietf:params:netconf:base:1.1</capability></capabilities>\
</hello>";

struct Client {
    stream: TcpStream,
    frames: FrameReader<TcpStream>,
    server_hello: XmlElement,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).expect("connect");
        let mut frames = FrameReader::new(stream.try_clone().expect("clone stream"));
        let server_hello = parse(
            &frames
                .read_frame()
                .expect("read server hello")
                .expect("server hello frame"),
        )
        .expect("server hello xml");
        send_frame(&mut stream, CLIENT_HELLO).expect("send client hello");
        Self { stream, frames, server_hello }
    }

    fn rpc(&mut self, message: &str) -> XmlElement {
        send_frame(&mut self.stream, message).expect("send rpc");
        let reply = self
            .frames
            .read_frame()
            .expect("read reply")
            .expect("reply frame");
        parse(&reply).expect("reply xml")
    }
}

fn spawn_agent() -> (SocketAddr, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ConfigStore::new(dir.path());
    store.ensure_seeded().expect("seed store");

    let server = Server::new(build_registry(store, &[]));
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    thread::spawn(move || {
        let _ = serve(listener, server);
    });
    (addr, dir)
}

#[test]
fn hello_exchange_advertises_base_and_xpath() {
    let (addr, _dir) = spawn_agent();
    let client = Client::connect(addr);

    let capabilities: Vec<&str> = client
        .server_hello
        .child("capabilities")
        .expect("capabilities")
        .children_named("capability")
        .map(XmlElement::trimmed_text)
        .collect();
    assert!(capabilities.contains(&"urn:ietf:params:netconf:base:1.0"));
    assert!(capabilities.contains(&"urn:ietf:params:netconf:base:1.1"));
    assert!(capabilities.contains(&"urn:ietf:params:netconf:capability:xpath:1.0"));
    assert!(client.server_hello.child("session-id").is_some());
}

#[test]
fn get_config_returns_seeded_components() {
    let (addr, _dir) = spawn_agent();
    let mut client = Client::connect(addr);

    let reply = client.rpc(
        "<rpc message-id=\"1\"><get-config><source><running/></source></get-config></rpc>",
    );
    assert_eq!(reply.attr("message-id"), Some("1"));
    let components = reply
        .child("data")
        .expect("data")
        .child("components")
        .expect("components");
    assert_eq!(components.children.len(), 2);
}

#[test]
fn get_config_with_subtree_filter_selects_one_component() {
    let (addr, _dir) = spawn_agent();
    let mut client = Client::connect(addr);

    let reply = client.rpc(
        "<rpc message-id=\"2\"><get-config><source><running/></source>\
         <filter type=\"subtree\"><components><component><name>fan0</name></component></components></filter>\
         </get-config></rpc>",
    );
    let components = reply
        .child("data")
        .expect("data")
        .child("components")
        .expect("components");
    assert_eq!(components.children.len(), 1);
    assert_eq!(
        components.children[0].child("name").expect("name").trimmed_text(),
        "fan0"
    );
    assert_eq!(
        components.children[0].child("type").expect("type").trimmed_text(),
        "FAN"
    );
}

#[test]
fn edit_config_merge_is_visible_to_later_reads() {
    let (addr, _dir) = spawn_agent();
    let mut client = Client::connect(addr);

    let reply = client.rpc(
        "<rpc message-id=\"3\"><edit-config><target><candidate/></target><config>\
         <components><component><name>cpu0</name><state>DISABLED</state></component></components>\
         </config></edit-config></rpc>",
    );
    assert!(reply.child("ok").is_some());

    let reply = client.rpc(
        "<rpc message-id=\"4\"><get-config><source><candidate/></source>\
         <filter type=\"xpath\" select=\"/components/component[name='cpu0']\"/>\
         </get-config></rpc>",
    );
    let component = reply
        .child("data")
        .expect("data")
        .child("components")
        .expect("components")
        .child("component")
        .expect("component");
    assert_eq!(component.child("state").expect("state").trimmed_text(), "DISABLED");
}

#[test]
fn lock_conflicts_are_visible_across_connections() {
    let (addr, _dir) = spawn_agent();
    let mut alice = Client::connect(addr);
    let mut bob = Client::connect(addr);

    let granted =
        alice.rpc("<rpc message-id=\"1\"><lock><target><running/></target></lock></rpc>");
    assert!(granted.child("ok").is_some());

    let denied = bob.rpc("<rpc message-id=\"2\"><lock><target><running/></target></lock></rpc>");
    let error = denied.child("rpc-error").expect("rpc-error");
    assert_eq!(error.child("error-tag").expect("tag").trimmed_text(), "lock-denied");

    // Alice disconnecting force-releases the lock for Bob.
    let closed = alice.rpc("<rpc message-id=\"3\"><close-session/></rpc>");
    assert!(closed.child("ok").is_some());

    let granted = bob.rpc("<rpc message-id=\"4\"><lock><target><running/></target></lock></rpc>");
    assert!(granted.child("ok").is_some());
}

#[test]
fn system_operations_are_access_denied() {
    let (addr, _dir) = spawn_agent();
    let mut client = Client::connect(addr);

    let reply = client.rpc("<rpc message-id=\"5\"><system-restart/></rpc>");
    let error = reply.child("rpc-error").expect("rpc-error");
    assert_eq!(error.child("error-tag").expect("tag").trimmed_text(), "access-denied");
}
