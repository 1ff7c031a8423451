use dfs_lib::{DfsError, DfsPath, DfsResult, Inode, InodeId, JournalAction, ROOT_INODE_ID};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directory {
    pub inode: Inode,
    pub child_files: BTreeMap<String, Inode>,
    pub child_dirs: BTreeMap<String, Directory>,
}

impl Directory {
    pub fn new(inode: Inode) -> Self {
        Self {
            inode,
            child_files: BTreeMap::new(),
            child_dirs: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.child_files.is_empty() && self.child_dirs.is_empty()
    }

    /// True if `name` is taken by either a file or a directory child.
    pub fn contains(&self, name: &str) -> bool {
        self.child_files.contains_key(name) || self.child_dirs.contains_key(name)
    }

    /// Child inodes, files first then directories, each ordered by name.
    pub fn list_children(&self) -> Vec<Inode> {
        let mut children = Vec::with_capacity(self.child_files.len() + self.child_dirs.len());
        children.extend(self.child_files.values().cloned());
        children.extend(self.child_dirs.values().map(|d| d.inode.clone()));
        children
    }

    fn insert_file(&mut self, inode: Inode) -> DfsResult<()> {
        if self.contains(&inode.name) {
            return Err(DfsError::AlreadyExists(format!(
                "{} already exists in directory {}",
                inode.name, self.inode.name
            )));
        }
        self.child_files.insert(inode.name.clone(), inode);
        Ok(())
    }

    fn insert_dir(&mut self, dir: Directory) -> DfsResult<()> {
        if self.contains(&dir.inode.name) {
            return Err(DfsError::AlreadyExists(format!(
                "{} already exists in directory {}",
                dir.inode.name, self.inode.name
            )));
        }
        self.child_dirs.insert(dir.inode.name.clone(), dir);
        Ok(())
    }

    fn max_inode_id(&self) -> InodeId {
        let mut max_id = self.inode.id;
        let mut stack = vec![self];
        while let Some(dir) = stack.pop() {
            max_id = max_id.max(dir.inode.id);
            for file in dir.child_files.values() {
                max_id = max_id.max(file.id);
            }
            stack.extend(dir.child_dirs.values());
        }
        max_id
    }
}

/// The in-memory namespace. Not synchronized itself: the owner keeps it behind
/// the namespace lock, and the inode counter is only advanced under that lock.
#[derive(Debug)]
pub struct NamespaceTree {
    root: Directory,
    next_inode_id: InodeId,
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceTree {
    /// The root is never journaled, so it gets a fixed timestamp and a
    /// journal-only recovery rebuilds exactly the same tree.
    pub fn new() -> Self {
        Self {
            root: Directory::new(Inode::root(0)),
            next_inode_id: ROOT_INODE_ID + 1,
        }
    }

    /// Build a tree around an existing root. The counter never goes backwards
    /// past an id already present in the tree.
    pub fn from_root(root: Directory, next_inode_id: InodeId) -> DfsResult<Self> {
        if root.inode.id != ROOT_INODE_ID || !root.inode.is_dir {
            return Err(DfsError::Corrupted(format!(
                "root inode must be directory {} but got id={} is_dir={}",
                ROOT_INODE_ID, root.inode.id, root.inode.is_dir
            )));
        }
        let floor = root.max_inode_id() + 1;
        Ok(Self {
            root,
            next_inode_id: next_inode_id.max(floor),
        })
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    pub fn next_inode_id(&self) -> InodeId {
        self.next_inode_id
    }

    pub fn alloc_inode_id(&mut self) -> InodeId {
        let id = self.next_inode_id;
        self.next_inode_id += 1;
        id
    }

    fn observe_inode_id(&mut self, id: InodeId) {
        if id >= self.next_inode_id {
            self.next_inode_id = id + 1;
        }
    }

    pub fn find_directory(&self, path: &DfsPath) -> Option<&Directory> {
        let mut current = &self.root;
        for part in path.components() {
            current = current.child_dirs.get(part)?;
        }
        Some(current)
    }

    pub fn find_directory_mut(&mut self, path: &DfsPath) -> Option<&mut Directory> {
        let mut current = &mut self.root;
        for part in path.components() {
            current = current.child_dirs.get_mut(part)?;
        }
        Some(current)
    }

    fn parent_of(&self, path: &DfsPath) -> DfsResult<(&Directory, String)> {
        let (parent_path, name) = path
            .split_parent_name()
            .ok_or_else(|| DfsError::NotFound(format!("{} has no parent directory", path)))?;
        let parent = self.find_directory(&parent_path).ok_or_else(|| {
            DfsError::NotFound(format!("parent directory {} not found", parent_path))
        })?;
        Ok((parent, name))
    }

    pub fn lookup_file(&self, path: &DfsPath) -> DfsResult<&Inode> {
        let (parent, name) = self.parent_of(path)?;
        parent
            .child_files
            .get(&name)
            .ok_or_else(|| DfsError::NotFound(format!("file {} not found", path)))
    }

    pub fn list_directory(&self, path: &DfsPath) -> DfsResult<Vec<Inode>> {
        self.find_directory(path)
            .map(|dir| dir.list_children())
            .ok_or_else(|| DfsError::NotFound(format!("directory {} not found", path)))
    }

    /// Validate a create request and return the new child name.
    pub fn check_create(&self, path: &DfsPath) -> DfsResult<String> {
        if path.is_root() {
            return Err(DfsError::AlreadyExists("/".to_string()));
        }
        let (parent, name) = self.parent_of(path)?;
        if parent.child_files.contains_key(&name) {
            return Err(DfsError::AlreadyExists(format!("file {} already exists", path)));
        }
        if parent.child_dirs.contains_key(&name) {
            return Err(DfsError::AlreadyExists(format!(
                "directory {} already exists",
                path
            )));
        }
        Ok(name)
    }

    pub fn check_delete_file(&self, path: &DfsPath) -> DfsResult<()> {
        self.lookup_file(path).map(|_| ())
    }

    pub fn check_delete_dir(&self, path: &DfsPath) -> DfsResult<()> {
        if path.is_root() {
            return Err(DfsError::InvalidParam(
                "cannot delete the root directory".to_string(),
            ));
        }
        let (parent, name) = self.parent_of(path)?;
        let dir = parent
            .child_dirs
            .get(&name)
            .ok_or_else(|| DfsError::NotFound(format!("directory {} not found", path)))?;
        if !dir.is_empty() {
            return Err(DfsError::NotEmpty(format!(
                "directory {} has {} children",
                path,
                dir.child_files.len() + dir.child_dirs.len()
            )));
        }
        Ok(())
    }

    /// Apply one mutation. Used for live commits and for journal/snapshot replay,
    /// so it re-checks every precondition instead of trusting the caller.
    pub fn apply(
        &mut self,
        action: JournalAction,
        path: &DfsPath,
        inode: Option<Inode>,
    ) -> DfsResult<()> {
        let (parent_path, name) = path.split_parent_name().ok_or_else(|| {
            DfsError::InvalidParam(format!("{} is not allowed on the root directory", action))
        })?;
        let created_id = inode.as_ref().map(|i| i.id);

        let parent = self.find_directory_mut(&parent_path).ok_or_else(|| {
            DfsError::NotFound(format!("parent directory {} not found", parent_path))
        })?;

        match action {
            JournalAction::CreateFile | JournalAction::CreateDirectory => {
                let inode = inode.ok_or_else(|| {
                    DfsError::InvalidParam(format!("{} {} without inode", action, path))
                })?;
                let want_dir = action == JournalAction::CreateDirectory;
                if inode.is_dir != want_dir || inode.name != name {
                    return Err(DfsError::InvalidParam(format!(
                        "{} {} carries mismatched inode name={} is_dir={}",
                        action, path, inode.name, inode.is_dir
                    )));
                }
                if want_dir {
                    parent.insert_dir(Directory::new(inode))?;
                } else {
                    parent.insert_file(inode)?;
                }
            }
            JournalAction::DeleteFile => {
                parent
                    .child_files
                    .remove(&name)
                    .ok_or_else(|| DfsError::NotFound(format!("file {} not found", path)))?;
            }
            JournalAction::DeleteDirectory => {
                let dir = parent
                    .child_dirs
                    .get(&name)
                    .ok_or_else(|| DfsError::NotFound(format!("directory {} not found", path)))?;
                if !dir.is_empty() {
                    return Err(DfsError::NotEmpty(format!("directory {} is not empty", path)));
                }
                parent.child_dirs.remove(&name);
            }
        }

        if let Some(id) = created_id {
            self.observe_inode_id(id);
        }
        Ok(())
    }

    pub fn inode_count(&self) -> usize {
        let mut count = 1;
        let mut stack = vec![&self.root];
        while let Some(dir) = stack.pop() {
            count += dir.child_files.len() + dir.child_dirs.len();
            stack.extend(dir.child_dirs.values());
        }
        count
    }
}
