//! sled-backed gateways. Each record lives in its own tree, CBOR encoded.
use super::{DetailPatch, DetailStore, ReferencePatch, ReferenceStore};
use crate::achievement::{AchievementDetail, AchievementReference, NewDetail};
use crate::error::StoreError;
use crate::identity::{IdentityResolver, Lecturer, Student};
use crate::utils::{self, DETAIL_HRP};
use sled::{Db, Tree};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

const REFERENCE_TREE: &str = "achievement_references";
const DETAIL_TREE: &str = "achievement_details";
const STUDENT_TREE: &str = "students";
const LECTURER_TREE: &str = "lecturers";
const STUDENT_USER_TREE: &str = "student_users";
const LECTURER_USER_TREE: &str = "lecturer_users";

/// Load a record from a tree
fn load<T>(tree: &Tree, key: &str) -> Result<Option<T>, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Save a record to a tree, overwriting whatever was there
fn save<T: minicbor::Encode<()>>(tree: &Tree, key: &str, value: &T) -> Result<(), StoreError> {
    tree.insert(key.as_bytes(), minicbor::to_vec(value)?)?;
    Ok(())
}

fn load_all<T>(tree: &Tree) -> Result<Vec<T>, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    let mut records = Vec::new();
    for entry in tree.iter() {
        let (_, bytes) = entry?;
        records.push(minicbor::decode(&bytes)?);
    }
    Ok(records)
}

/// Decode, patch and re-encode a record in one atomic step.
///
/// sled may run the closure more than once under contention, so the
/// failure slot is reset on every attempt.
fn patch_record<T, F>(tree: &Tree, key: &str, apply: F) -> Result<T, StoreError>
where
    T: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()>,
    F: Fn(&mut T),
{
    let mut failure: Option<StoreError> = None;
    let updated = tree.update_and_fetch(key.as_bytes(), |current| {
        failure = None;
        let bytes = current?;
        let encoded = minicbor::decode::<T>(bytes)
            .map_err(StoreError::from)
            .and_then(|mut record| {
                apply(&mut record);
                minicbor::to_vec(&record).map_err(StoreError::from)
            });
        match encoded {
            Ok(encoded) => Some(encoded),
            Err(err) => {
                // leave the stored bytes untouched
                failure = Some(err);
                Some(bytes.to_vec())
            }
        }
    })?;

    if let Some(err) = failure {
        return Err(err);
    }
    match updated {
        Some(bytes) => Ok(minicbor::decode(&bytes)?),
        None => Err(StoreError::Missing(key.to_string())),
    }
}

fn require_id(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Invalid(format!("{field} must not be blank")));
    }
    Ok(())
}

fn sort_references(refs: &mut [AchievementReference]) {
    refs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Opens every tree the service needs from one database handle.
pub struct SledStores {
    pub references: Arc<SledReferenceStore>,
    pub details: Arc<SledDetailStore>,
    pub directory: Arc<SledDirectory>,
}

impl SledStores {
    pub fn open(db: Arc<Db>) -> Result<Self, StoreError> {
        Ok(Self {
            references: Arc::new(SledReferenceStore::new(db.open_tree(REFERENCE_TREE)?)),
            details: Arc::new(SledDetailStore::new(db.open_tree(DETAIL_TREE)?)),
            directory: Arc::new(SledDirectory {
                students: db.open_tree(STUDENT_TREE)?,
                lecturers: db.open_tree(LECTURER_TREE)?,
                student_users: db.open_tree(STUDENT_USER_TREE)?,
                lecturer_users: db.open_tree(LECTURER_USER_TREE)?,
            }),
        })
    }
}

pub struct SledReferenceStore {
    tree: Tree,
}

impl SledReferenceStore {
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }
}

impl ReferenceStore for SledReferenceStore {
    fn insert(&self, reference: &AchievementReference) -> Result<(), StoreError> {
        save(&self.tree, &reference.id, reference)
    }

    fn update_fields(&self, id: &str, patch: &ReferencePatch) -> Result<AchievementReference, StoreError> {
        patch_record(&self.tree, id, |reference: &mut AchievementReference| patch.apply(reference))
    }

    fn get_by_id(&self, id: &str) -> Result<Option<AchievementReference>, StoreError> {
        load(&self.tree, id)
    }

    fn get_by_student_ids(&self, student_ids: &[String]) -> Result<Vec<AchievementReference>, StoreError> {
        let wanted: HashSet<&str> = student_ids.iter().map(String::as_str).collect();
        let mut refs: Vec<AchievementReference> = load_all::<AchievementReference>(&self.tree)?
            .into_iter()
            .filter(|r| wanted.contains(r.student_id.as_str()))
            .collect();
        sort_references(&mut refs);
        Ok(refs)
    }

    fn get_all(&self) -> Result<Vec<AchievementReference>, StoreError> {
        let mut refs = load_all(&self.tree)?;
        sort_references(&mut refs);
        Ok(refs)
    }
}

pub struct SledDetailStore {
    tree: Tree,
}

impl SledDetailStore {
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }
}

impl DetailStore for SledDetailStore {
    fn insert(&self, detail: NewDetail) -> Result<String, StoreError> {
        let id = utils::new_uuid_to_bech32(DETAIL_HRP)
            .map_err(|e| StoreError::IdGeneration(e.to_string()))?;
        save(&self.tree, &id, &detail.into_detail(id.clone()))?;
        Ok(id)
    }

    fn update_fields(&self, id: &str, patch: &DetailPatch) -> Result<AchievementDetail, StoreError> {
        patch_record(&self.tree, id, |detail: &mut AchievementDetail| patch.apply(detail))
    }

    fn get_by_id(&self, id: &str) -> Result<Option<AchievementDetail>, StoreError> {
        load(&self.tree, id)
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<BTreeMap<String, AchievementDetail>, StoreError> {
        let mut found = BTreeMap::new();
        for id in ids {
            if let Some(detail) = load::<AchievementDetail>(&self.tree, id)? {
                found.insert(id.clone(), detail);
            }
        }
        Ok(found)
    }

    fn get_all(&self) -> Result<Vec<AchievementDetail>, StoreError> {
        load_all(&self.tree)
    }
}

/// Student and lecturer records with their login lookups.
pub struct SledDirectory {
    students: Tree,
    lecturers: Tree,
    student_users: Tree,
    lecturer_users: Tree,
}

impl SledDirectory {
    /// Insert or replace a student. A changed login replaces the old one.
    pub fn register_student(&self, student: &Student) -> Result<(), StoreError> {
        require_id("student_id", &student.student_id)?;
        require_id("user_id", &student.user_id)?;
        if let Some(advisor_id) = &student.advisor_id {
            self.require_lecturer(advisor_id)?;
        }
        if let Some(previous) = self.student(&student.student_id)? {
            if previous.user_id != student.user_id {
                self.student_users.remove(previous.user_id.as_bytes())?;
            }
        }
        save(&self.students, &student.student_id, student)?;
        self.student_users
            .insert(student.user_id.as_bytes(), student.student_id.as_bytes())?;
        Ok(())
    }

    pub fn register_lecturer(&self, lecturer: &Lecturer) -> Result<(), StoreError> {
        require_id("lecturer_id", &lecturer.lecturer_id)?;
        require_id("user_id", &lecturer.user_id)?;
        if let Some(previous) = self.lecturer(&lecturer.lecturer_id)? {
            if previous.user_id != lecturer.user_id {
                self.lecturer_users.remove(previous.user_id.as_bytes())?;
            }
        }
        save(&self.lecturers, &lecturer.lecturer_id, lecturer)?;
        self.lecturer_users
            .insert(lecturer.user_id.as_bytes(), lecturer.lecturer_id.as_bytes())?;
        Ok(())
    }

    /// Points a student at a new advisor, or clears it with `None`.
    pub fn assign_advisor(&self, student_id: &str, advisor_id: Option<&str>) -> Result<Student, StoreError> {
        let mut student = self
            .student(student_id)?
            .ok_or_else(|| StoreError::Missing(student_id.to_string()))?;
        if let Some(advisor_id) = advisor_id {
            self.require_lecturer(advisor_id)?;
        }
        student.advisor_id = advisor_id.map(str::to_string);
        save(&self.students, student_id, &student)?;
        Ok(student)
    }

    pub fn student(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        load(&self.students, student_id)
    }

    pub fn lecturer(&self, lecturer_id: &str) -> Result<Option<Lecturer>, StoreError> {
        load(&self.lecturers, lecturer_id)
    }

    /// Every student, ordered by student id.
    pub fn all_students(&self) -> Result<Vec<Student>, StoreError> {
        load_all(&self.students)
    }

    /// Every lecturer, ordered by lecturer id.
    pub fn all_lecturers(&self) -> Result<Vec<Lecturer>, StoreError> {
        load_all(&self.lecturers)
    }

    fn require_lecturer(&self, lecturer_id: &str) -> Result<(), StoreError> {
        match self.lecturers.contains_key(lecturer_id.as_bytes())? {
            true => Ok(()),
            false => Err(StoreError::Missing(lecturer_id.to_string())),
        }
    }

    fn lookup_user(tree: &Tree, user_id: &str) -> Result<Option<String>, StoreError> {
        match tree.get(user_id.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }
}

impl IdentityResolver for SledDirectory {
    fn student_id_for_user(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Self::lookup_user(&self.student_users, user_id)
    }

    fn advisor_id_for_user(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Self::lookup_user(&self.lecturer_users, user_id)
    }

    fn advisor_of(&self, student_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.student(student_id)?.and_then(|s| s.advisor_id))
    }

    fn advisees(&self, advisor_id: &str) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = load_all::<Student>(&self.students)?
            .into_iter()
            .filter(|s| s.advisor_id.as_deref() == Some(advisor_id))
            .map(|s| s.student_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn all_student_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for key in self.students.iter().keys() {
            ids.push(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(ids)
    }

    fn students_by_ids(&self, ids: &[String]) -> Result<BTreeMap<String, Student>, StoreError> {
        let mut found = BTreeMap::new();
        for id in ids {
            if let Some(student) = self.student(id)? {
                found.insert(id.clone(), student);
            }
        }
        Ok(found)
    }
}
