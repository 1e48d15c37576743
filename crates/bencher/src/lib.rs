#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    chain: TestChain,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, chain: TestChain) -> Self {
        Self { name, group, chain }
    }

    pub fn small(name: &'static str, chain: TestChain) -> Self {
        Self::new(name, TestGroup::Small, chain)
    }

    pub fn normal(name: &'static str, chain: TestChain) -> Self {
        Self::new(name, TestGroup::Normal, chain)
    }

    pub fn large(name: &'static str, chain: TestChain) -> Self {
        Self::new(name, TestGroup::Large, chain)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn chain(&self) -> &TestChain {
        &self.chain
    }
}

/// Shape of a benchmarked filter chain: `misses` ruled filters that never match the
/// request, then the target rule whose handler sits behind `wrappers` pass-through filters.
#[derive(Debug, Copy, Clone)]
pub struct TestChain {
    misses: usize,
    wrappers: usize,
}

impl TestChain {
    pub const TARGET_RULE: &'static str = "/target/:id";
    pub const TARGET_PATH: &'static str = "/target/42";

    pub const fn new(misses: usize, wrappers: usize) -> Self {
        Self { misses, wrappers }
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn wrappers(&self) -> usize {
        self.wrappers
    }

    /// Rule of the `index`th missing filter, a template that shares the first segment shape
    /// with the target so matching can't stop at the literal prefix.
    pub fn miss_rule(index: usize) -> String {
        format!("/miss-{index}/:id")
    }

    pub fn filter_count(&self) -> usize {
        self.misses + self.wrappers + 1
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}
