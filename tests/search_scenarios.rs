use xml_search_mcp::{children_for_ordinal, list_children, search, Category, ConfigNode, Document, SearchError};

const RUNNING_CONFIG: &str = r#"<response status="success"><result>
  <config version="10.1.0">
    <devices>
      <entry name="localhost.localdomain">
        <vsys>
          <entry name="vsys1">
            <rulebase>
              <security>
                <rules>
                  <entry name="allow-web">
                    <to>
                      <member>untrust</member>
                    </to>
                    <from>
                      <member>trust</member>
                    </from>
                    <application>
                      <member>web-browsing</member>
                      <member>ssl</member>
                    </application>
                    <action>allow</action>
                  </entry>
                  <entry name="block-web">
                    <to>
                      <member>untrust</member>
                    </to>
                    <action>deny</action>
                  </entry>
                </rules>
              </security>
            </rulebase>
            <address>
              <entry name="web-server">
                <ip-netmask>10.0.0.5/32</ip-netmask>
              </entry>
            </address>
          </entry>
        </vsys>
      </entry>
    </devices>
  </config>
</result></response>"#;

const VSYS: &str = "/config/devices/entry/vsys/entry";
const RULES: &str = "/config/devices/entry/vsys/entry/rulebase/security/rules";

fn config() -> Document {
    Document::parse(RUNNING_CONFIG).unwrap()
}

#[test]
fn keyword_in_attributes_and_text() {
    let doc = config();
    let results = search(&doc.scope(), "web").unwrap();

    assert!(results.tags.is_empty());
    assert_eq!(
        results.attributes,
        vec![
            format!("{VSYS}/address/entry[@name='web-server']"),
            format!("{RULES}/entry[@name='allow-web']"),
            format!("{RULES}/entry[@name='block-web']"),
        ]
    );
    assert_eq!(
        results.text,
        vec![format!("{RULES}/entry[@name='allow-web']/application/member[text()='web-browsing']")]
    );
    assert_eq!(results.locate(3), Some((Category::Attribute, 2)));
    assert_eq!(results.locate(4), Some((Category::Text, 0)));
}

#[test]
fn keyword_in_tags_lists_every_leaf() {
    let doc = config();
    let results = search(&doc.scope(), "member").unwrap();

    assert_eq!(
        results.tags,
        vec![
            format!("{RULES}/entry[@name='allow-web']/application/member[text()='ssl']"),
            format!("{RULES}/entry[@name='allow-web']/application/member[text()='web-browsing']"),
            format!("{RULES}/entry[@name='allow-web']/from/member[text()='trust']"),
            format!("{RULES}/entry[@name='allow-web']/to/member[text()='untrust']"),
            format!("{RULES}/entry[@name='block-web']/to/member[text()='untrust']"),
        ]
    );
    assert!(results.attributes.is_empty());
    assert!(results.text.is_empty());
}

#[test]
fn singleton_entries_render_bare_as_ancestors() {
    let doc = config();
    let results = search(&doc.scope(), "vsys").unwrap();

    assert_eq!(results.tags, vec!["/config/devices/entry/vsys"]);
    assert_eq!(results.attributes, vec!["/config/devices/entry/vsys/entry[@name='vsys1']"]);
    assert!(results.text.is_empty());
}

#[test]
fn drill_into_attribute_hit() {
    let doc = config();
    let results = search(&doc.scope(), "web").unwrap();

    // A fresh tree, as after a re-fetch.
    let fresh = config();
    let children = children_for_ordinal(&fresh.scope(), &results, 2).unwrap();
    assert_eq!(
        children,
        vec![
            format!("{RULES}/entry[@name='allow-web']/to"),
            format!("{RULES}/entry[@name='allow-web']/from"),
            format!("{RULES}/entry[@name='allow-web']/application"),
            format!("{RULES}/entry[@name='allow-web']/action[text()='allow']"),
        ]
    );
}

#[test]
fn drill_through_singleton_entries() {
    let doc = config();
    let scope = doc.scope();
    let results = search(&scope, "vsys").unwrap();

    assert_eq!(
        children_for_ordinal(&scope, &results, 1).unwrap(),
        vec!["/config/devices/entry/vsys/entry[@name='vsys1']"]
    );
    assert_eq!(
        children_for_ordinal(&scope, &results, 2).unwrap(),
        vec![format!("{VSYS}[@name='vsys1']/rulebase"), format!("{VSYS}[@name='vsys1']/address")]
    );
}

#[test]
fn text_hit_on_leaf_has_no_children() {
    let doc = config();
    let scope = doc.scope();
    let results = search(&scope, r"10\.0\.0\.5").unwrap();

    assert_eq!(
        results.text,
        vec![format!("{VSYS}/address/entry[@name='web-server']/ip-netmask[text()='10.0.0.5/32']")]
    );
    assert!(children_for_ordinal(&scope, &results, 1).unwrap().is_empty());

    let parent = list_children(&scope, &format!("{VSYS}/address/entry[@name='web-server']"));
    assert_eq!(parent, vec![format!("{VSYS}/address/entry[@name='web-server']/ip-netmask[text()='10.0.0.5/32']")]);
}

#[test]
fn path_gone_from_fresh_tree_has_no_children() {
    let doc = config();
    let results = search(&doc.scope(), "block").unwrap();
    assert_eq!(results.attributes, vec![format!("{RULES}/entry[@name='block-web']")]);

    let changed = Document::parse(&RUNNING_CONFIG.replace("block-web", "drop-web")).unwrap();
    assert!(children_for_ordinal(&changed.scope(), &results, 1).unwrap().is_empty());
}

#[test]
fn same_text_in_two_rules() {
    let doc = config();
    let results = search(&doc.scope(), "^untrust$").unwrap();
    assert_eq!(
        results.text,
        vec![
            format!("{RULES}/entry[@name='allow-web']/to/member[text()='untrust']"),
            format!("{RULES}/entry[@name='block-web']/to/member[text()='untrust']"),
        ]
    );
}

#[test]
fn overlapping_tag_and_text_hits() {
    let doc = Document::parse(r#"<result><entry name="rule1"><to><member>any</member></to></entry></result>"#).unwrap();
    let scope = doc.scope();

    let by_tag = search(&scope, "member").unwrap();
    assert_eq!(by_tag.tags, vec!["/entry[@name='rule1']/to/member[text()='any']"]);
    assert!(by_tag.text.is_empty());

    let both = search(&scope, "member|any").unwrap();
    assert_eq!(both.tags, vec!["/entry[@name='rule1']/to/member[text()='any']"]);
    assert_eq!(both.text, vec!["/entry[@name='rule1']/to/member[text()='any']"]);
    assert_eq!(both.total(), 2);
}

#[test]
fn invalid_keywords_are_recoverable() {
    let doc = config();
    assert!(matches!(search(&doc.scope(), "  "), Err(SearchError::EmptyKeyword)));
    assert!(matches!(search(&doc.scope(), "[web"), Err(SearchError::MalformedPattern(_))));
    // the same tree still searches fine afterwards
    assert_eq!(search(&doc.scope(), "deny").unwrap().text.len(), 1);
}

// ---------------------------------------------------------------------------
// Any tree implementing ConfigNode can be searched
// ---------------------------------------------------------------------------

struct Node {
    tag: &'static str,
    name: Option<&'static str>,
    text: Option<&'static str>,
    children: Vec<Node>,
}

fn node(tag: &'static str, name: Option<&'static str>, text: Option<&'static str>, children: Vec<Node>) -> Node {
    Node { tag, name, text, children }
}

impl ConfigNode for Node {
    fn tag(&self) -> &str {
        self.tag
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        (name == "name").then_some(self.name).flatten()
    }

    fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter()
    }

    fn text_runs(&self) -> impl Iterator<Item = &str> {
        self.text.into_iter()
    }

    fn leading_text(&self) -> Option<String> {
        self.text.map(str::to_string)
    }
}

#[test]
fn searches_custom_tree() {
    let tree = node("shared", None, None, vec![
        node("address", None, None, vec![
            node("entry", Some("dns-1"), None, vec![node("ip-netmask", None, Some("8.8.8.8"), vec![])]),
            node("entry", Some("dns-2"), None, vec![node("ip-netmask", None, Some("8.8.4.4"), vec![])]),
        ]),
    ]);
    let scope = [&tree];

    let results = search(&scope, "8\\.8").unwrap();
    assert_eq!(
        results.text,
        vec![
            "/shared/address/entry[@name='dns-1']/ip-netmask[text()='8.8.8.8']",
            "/shared/address/entry[@name='dns-2']/ip-netmask[text()='8.8.4.4']",
        ]
    );
    assert_eq!(
        list_children(&scope, "/shared/address/entry[@name='dns-2']"),
        vec!["/shared/address/entry[@name='dns-2']/ip-netmask[text()='8.8.4.4']"]
    );
}
