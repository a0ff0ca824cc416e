use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::Reader;

/// 中间文档树节点
///
/// 结构分析服务返回的TEI标记和各降级分支构造的树都统一为这个形状，
/// 下游解析器只面对一种消费契约。
#[derive(Debug, Clone, PartialEq)]
pub struct DocNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<DocNode>,
}

impl DocNode {
    pub fn element(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(name: &str, text: &str) -> Self {
        let mut node = Self::element(name);
        node.text = text.to_string();
        node
    }

    /// 链式构造：附加属性
    pub fn attr_value(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    /// 链式构造：附加子节点
    pub fn child(mut self, node: DocNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn push(&mut self, node: DocNode) {
        self.children.push(node);
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 同名子节点归一化为序列（无论出现零次、一次还是多次）
    pub fn children_named(&self, name: &str) -> Vec<&DocNode> {
        self.children.iter().filter(|c| c.name == name).collect()
    }

    pub fn first(&self, name: &str) -> Option<&DocNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// 沿路径逐层取首个匹配子节点
    pub fn find(&self, path: &[&str]) -> Option<&DocNode> {
        let mut node = self;
        for name in path {
            node = node.first(name)?;
        }
        Some(node)
    }

    /// 收集整棵子树（含自身）中所有指定名称的节点
    pub fn descendants(&self, name: &str) -> Vec<&DocNode> {
        let mut out = Vec::new();
        self.collect_named(name, &[], &mut out);
        out
    }

    /// 同 descendants，但不深入指定名称的容器子节点
    pub fn descendants_bounded<'a>(&'a self, name: &str, barriers: &[&str]) -> Vec<&'a DocNode> {
        let mut out = Vec::new();
        for child in &self.children {
            child.collect_named(name, barriers, &mut out);
        }
        out
    }

    fn collect_named<'a>(&'a self, name: &str, barriers: &[&str], out: &mut Vec<&'a DocNode>) {
        if self.name == name {
            out.push(self);
        }
        for child in &self.children {
            if barriers.contains(&child.name.as_str()) {
                continue;
            }
            child.collect_named(name, barriers, out);
        }
    }

    /// 提取节点文本，兼容三种形状：自身文本、文本包装子节点、嵌套段落列表
    pub fn text_content(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        self.gather_text(&mut parts);
        parts.join(" ").trim().to_string()
    }

    fn gather_text(&self, out: &mut Vec<String>) {
        let own = self.text.trim();
        if !own.is_empty() {
            out.push(own.to_string());
        }
        for child in &self.children {
            child.gather_text(out);
        }
    }

    /// 解析XML文本为文档树
    ///
    /// 标记不闭合或语法错误返回Err，调用方按最大努力策略降级而不是中断。
    pub fn parse_xml(xml: &str) -> Result<DocNode> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<DocNode> = vec![DocNode::element("document")];

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    stack.push(node_from_start(&e));
                }
                Ok(Event::Empty(e)) => {
                    let node = node_from_start(&e);
                    stack
                        .last_mut()
                        .expect("builder stack never empty")
                        .push(node);
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape()?;
                    append_text(stack.last_mut().expect("builder stack never empty"), &text);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    append_text(stack.last_mut().expect("builder stack never empty"), &text);
                }
                Ok(Event::End(_)) => {
                    let node = stack.pop().expect("builder stack never empty");
                    match stack.last_mut() {
                        Some(parent) => parent.push(node),
                        None => anyhow::bail!("结束标签多于开始标签"),
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => anyhow::bail!("XML解析失败: {}", e),
            }
        }

        if stack.len() != 1 {
            anyhow::bail!("XML标签未闭合，剩余 {} 层", stack.len() - 1);
        }

        let mut root = stack.pop().expect("builder stack never empty");
        // 合成包装节点只有一个子元素时直接展开
        if root.children.len() == 1 && root.text.trim().is_empty() {
            return Ok(root.children.remove(0));
        }
        Ok(root)
    }
}

fn node_from_start(e: &quick_xml::events::BytesStart<'_>) -> DocNode {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut node = DocNode::element(&name);
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        if let Ok(value) = attr.unescape_value() {
            node.attrs.push((key, value.into_owned()));
        }
    }
    node
}

fn append_text(node: &mut DocNode, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !node.text.is_empty() {
        node.text.push(' ');
    }
    node.text.push_str(text);
}
